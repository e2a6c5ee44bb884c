//! Press-and-hold detection
//!
//! Turns raw mouse/touch events into a single pressed/released signal for the
//! character surface. Touch browsers synthesize mouse events after touches, so
//! once any touch is seen every mouse event is ignored for the rest of the
//! page's lifetime.

use glam::Vec2;

/// Which kind of device started a press
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputKind {
    Mouse,
    Touch,
}

/// Raw pointer events, in viewport coordinates
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PointerInput {
    MouseDown(Vec2),
    MouseUp,
    MouseLeave,
    /// First touch point, if the event carried any
    TouchStart(Option<Vec2>),
    TouchEnd,
    TouchCancel,
}

impl PointerInput {
    pub fn kind(&self) -> InputKind {
        match self {
            PointerInput::MouseDown(_) | PointerInput::MouseUp | PointerInput::MouseLeave => {
                InputKind::Mouse
            }
            PointerInput::TouchStart(_) | PointerInput::TouchEnd | PointerInput::TouchCancel => {
                InputKind::Touch
            }
        }
    }
}

/// What lives under a point
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HitTarget {
    /// The character itself
    Face,
    /// Page background / main content area
    Background,
    /// Links, buttons and anything tagged clickable
    Control,
    /// Nothing resolvable (outside the page, removed element, ...)
    Nothing,
}

impl HitTarget {
    /// Whether a press here should start autofire
    pub fn accepts_press(&self) -> bool {
        matches!(self, HitTarget::Face | HitTarget::Background)
    }
}

/// Class names that mark a page area as background
pub const BACKGROUND_CLASSES: [&str; 2] = ["background", "main-content"];

/// Facts about the element under a point, gathered by the platform
#[derive(Debug, Clone, Copy)]
pub struct ElementFacts<'a> {
    /// Upper-case tag name, as the DOM reports it
    pub tag: &'a str,
    pub inside_control: bool,
    pub inside_face: bool,
    pub inside_main: bool,
    pub has_background_class: bool,
}

impl HitTarget {
    /// Classify an element. Controls win over the face, the face over background.
    pub fn classify(el: ElementFacts<'_>) -> Self {
        if el.inside_control {
            HitTarget::Control
        } else if el.inside_face {
            HitTarget::Face
        } else if el.tag == "BODY" || el.tag == "MAIN" || el.inside_main || el.has_background_class {
            HitTarget::Background
        } else {
            HitTarget::Nothing
        }
    }
}

/// Resolves points to page regions
pub trait HitTester {
    fn hit_test(&self, point: Vec2) -> HitTarget;
}

impl<F> HitTester for F
where
    F: Fn(Vec2) -> HitTarget,
{
    fn hit_test(&self, point: Vec2) -> HitTarget {
        self(point)
    }
}

/// One continuous press-and-hold gesture
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PressSession {
    pub started_at_ms: u64,
    pub input_kind: InputKind,
}

/// Result of feeding an event to the detector
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PressTransition {
    Started(PressSession),
    Ended(PressSession),
}

#[derive(Debug, Default)]
pub struct InteractionDetector {
    session: Option<PressSession>,
    touch_seen: bool,
}

impl InteractionDetector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_active(&self) -> bool {
        self.session.is_some()
    }

    pub fn session(&self) -> Option<&PressSession> {
        self.session.as_ref()
    }

    /// True once any touch event has been observed
    pub fn touch_seen(&self) -> bool {
        self.touch_seen
    }

    /// Feed one raw event. Returns a transition only when the press state flips.
    pub fn handle(
        &mut self,
        now_ms: u64,
        input: PointerInput,
        hits: &dyn HitTester,
    ) -> Option<PressTransition> {
        let kind = input.kind();
        if kind == InputKind::Touch {
            self.touch_seen = true;
        } else if self.touch_seen {
            log::debug!("Ignoring mouse event - touch events detected");
            return None;
        }

        match input {
            PointerInput::MouseDown(point) => self.press(now_ms, point, kind, hits),
            PointerInput::TouchStart(Some(point)) => self.press(now_ms, point, kind, hits),
            PointerInput::TouchStart(None) => None,
            PointerInput::MouseUp
            | PointerInput::MouseLeave
            | PointerInput::TouchEnd
            | PointerInput::TouchCancel => self.release(kind),
        }
    }

    fn press(
        &mut self,
        now_ms: u64,
        point: Vec2,
        kind: InputKind,
        hits: &dyn HitTester,
    ) -> Option<PressTransition> {
        if self.session.is_some() {
            return None;
        }
        let target = hits.hit_test(point);
        if !target.accepts_press() {
            log::debug!("Press at {point} ignored ({target:?})");
            return None;
        }

        let session = PressSession {
            started_at_ms: now_ms,
            input_kind: kind,
        };
        self.session = Some(session);
        log::info!("{kind:?} press started on {target:?}");
        Some(PressTransition::Started(session))
    }

    fn release(&mut self, kind: InputKind) -> Option<PressTransition> {
        let session = self.session.take()?;
        log::info!("{kind:?} press ended");
        Some(PressTransition::Ended(session))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn everywhere(target: HitTarget) -> impl Fn(Vec2) -> HitTarget {
        move |_| target
    }

    fn facts(tag: &str) -> ElementFacts<'_> {
        ElementFacts {
            tag,
            inside_control: false,
            inside_face: false,
            inside_main: false,
            has_background_class: false,
        }
    }

    #[test]
    fn test_classify_elements() {
        assert_eq!(HitTarget::classify(facts("BODY")), HitTarget::Background);
        assert_eq!(HitTarget::classify(facts("MAIN")), HitTarget::Background);
        assert_eq!(HitTarget::classify(facts("SPAN")), HitTarget::Nothing);
        let in_main = ElementFacts { inside_main: true, ..facts("P") };
        assert_eq!(HitTarget::classify(in_main), HitTarget::Background);

        // Classed wrappers outside <main> are background too
        let classed = ElementFacts { has_background_class: true, ..facts("DIV") };
        assert_eq!(HitTarget::classify(classed), HitTarget::Background);

        let face = ElementFacts { inside_face: true, ..facts("IMG") };
        assert_eq!(HitTarget::classify(face), HitTarget::Face);
        let button_on_face = ElementFacts { inside_control: true, ..face };
        assert_eq!(HitTarget::classify(button_on_face), HitTarget::Control);
        let link_in_background = ElementFacts { inside_control: true, ..classed };
        assert_eq!(HitTarget::classify(link_in_background), HitTarget::Control);
    }

    #[test]
    fn test_press_on_face_and_background_starts() {
        for target in [HitTarget::Face, HitTarget::Background] {
            let mut detector = InteractionDetector::new();
            let t = detector.handle(10, PointerInput::MouseDown(Vec2::ZERO), &everywhere(target));
            assert!(matches!(t, Some(PressTransition::Started(s)) if s.started_at_ms == 10));
            assert!(detector.is_active());
        }
    }

    #[test]
    fn test_press_on_controls_is_rejected() {
        for target in [HitTarget::Control, HitTarget::Nothing] {
            let mut detector = InteractionDetector::new();
            let t = detector.handle(0, PointerInput::MouseDown(Vec2::ZERO), &everywhere(target));
            assert_eq!(t, None);
            assert!(!detector.is_active());
        }
    }

    #[test]
    fn test_start_and_end_are_idempotent() {
        let hits = everywhere(HitTarget::Face);
        let mut detector = InteractionDetector::new();

        assert!(detector.handle(0, PointerInput::MouseDown(Vec2::ZERO), &hits).is_some());
        assert_eq!(detector.handle(5, PointerInput::MouseDown(Vec2::ZERO), &hits), None);
        assert_eq!(detector.session().map(|s| s.started_at_ms), Some(0));

        assert!(matches!(
            detector.handle(20, PointerInput::MouseUp, &hits),
            Some(PressTransition::Ended(_))
        ));
        assert_eq!(detector.handle(21, PointerInput::MouseLeave, &hits), None);
        assert_eq!(detector.handle(22, PointerInput::MouseUp, &hits), None);
    }

    #[test]
    fn test_mouse_ignored_after_touch() {
        let hits = everywhere(HitTarget::Face);
        let mut detector = InteractionDetector::new();
        let p = Vec2::new(100.0, 200.0);

        assert!(matches!(
            detector.handle(0, PointerInput::TouchStart(Some(p)), &hits),
            Some(PressTransition::Started(s)) if s.input_kind == InputKind::Touch
        ));
        // Synthetic mouse events at the same spot
        assert_eq!(detector.handle(1, PointerInput::MouseDown(p), &hits), None);
        assert_eq!(detector.handle(2, PointerInput::MouseUp, &hits), None);
        assert!(detector.is_active());

        assert!(detector.handle(3, PointerInput::TouchEnd, &hits).is_some());
        // Still ignored after the touch press is over
        assert_eq!(detector.handle(4, PointerInput::MouseDown(p), &hits), None);
        assert!(!detector.is_active());
    }

    #[test]
    fn test_touch_without_points_marks_touch_only() {
        let hits = everywhere(HitTarget::Face);
        let mut detector = InteractionDetector::new();
        assert_eq!(detector.handle(0, PointerInput::TouchStart(None), &hits), None);
        assert!(detector.touch_seen());
        assert_eq!(detector.handle(1, PointerInput::MouseDown(Vec2::ZERO), &hits), None);
    }

    #[test]
    fn test_touch_cancel_ends_press() {
        let hits = everywhere(HitTarget::Background);
        let mut detector = InteractionDetector::new();
        detector.handle(0, PointerInput::TouchStart(Some(Vec2::ONE)), &hits);
        assert!(matches!(
            detector.handle(9, PointerInput::TouchCancel, &hits),
            Some(PressTransition::Ended(_))
        ));
    }
}
