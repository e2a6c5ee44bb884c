//! DOM-backed stage and hit testing

use glam::Vec2;
use wasm_bindgen::{JsCast, JsValue};
use web_sys::{Document, Element, HtmlElement, Window};

use crate::audio::AudioManager;
use crate::bullets::{Bullet, BulletId};
use crate::input::{BACKGROUND_CLASSES, ElementFacts, HitTarget, HitTester};
use crate::stage::{CounterDisplay, CounterView, FaceOrigin, FaceState, HookError, Stage};

const FACE_SELECTOR: &str = ".dynamic-lol-face-container";
const COUNTER_ID: &str = "lol-counter";
const BULLET_LAYER_ID: &str = "bullet-layer";

/// Elements a press must not start autofire on
const CONTROL_SELECTORS: [&str; 8] = [
    "a",
    "button",
    ".copy-button",
    ".buy-button",
    "[role=\"button\"]",
    "[onclick]",
    ".clickable",
    ".interactive",
];

fn js_err(e: JsValue) -> HookError {
    HookError::Js(format!("{e:?}"))
}

fn bullet_dom_id(id: BulletId) -> String {
    format!("bullet-{id}")
}

pub struct DomStage {
    window: Window,
    document: Document,
    audio: AudioManager,
}

impl DomStage {
    pub fn new(audio: AudioManager) -> Result<Self, HookError> {
        let window = web_sys::window().ok_or(HookError::Unavailable("window"))?;
        let document = window.document().ok_or(HookError::Unavailable("document"))?;
        Ok(Self {
            window,
            document,
            audio,
        })
    }

    fn face_element(&self) -> Option<Element> {
        self.document.query_selector(FACE_SELECTOR).ok().flatten()
    }

    fn counter_element(&self) -> Result<Element, HookError> {
        self.document
            .get_element_by_id(COUNTER_ID)
            .ok_or(HookError::Unavailable("counter element"))
    }

    fn bullet_layer(&self) -> Result<Element, HookError> {
        self.document
            .get_element_by_id(BULLET_LAYER_ID)
            .or_else(|| self.document.body().map(Element::from))
            .ok_or(HookError::Unavailable("bullet layer"))
    }
}

impl CounterView for DomStage {
    fn counter_changed(&mut self, display: CounterDisplay) -> Result<(), HookError> {
        let el = self.counter_element()?;
        el.set_text_content(Some(&display.label()));
        let classes = el.class_list();
        classes
            .toggle_with_force("offline", display.offline)
            .map_err(js_err)?;
        Ok(())
    }

    fn counter_pulse(&mut self, active: bool) -> Result<(), HookError> {
        let el = self.counter_element()?;
        el.class_list()
            .toggle_with_force("counter-pulse", active)
            .map_err(js_err)?;
        Ok(())
    }
}

impl Stage for DomStage {
    fn set_face(&mut self, face: FaceState) -> Result<(), HookError> {
        let el = self
            .face_element()
            .ok_or(HookError::Unavailable("face element"))?;
        let shouting = face == FaceState::Shouting;
        let classes = el.class_list();
        classes.toggle_with_force("state-b", shouting).map_err(js_err)?;
        classes.toggle_with_force("state-a", !shouting).map_err(js_err)?;
        Ok(())
    }

    fn play_sound(&mut self) -> Result<(), HookError> {
        self.audio.play_lol()
    }

    fn spawn_bullet(&mut self, bullet: &Bullet) -> Result<(), HookError> {
        let el: HtmlElement = self
            .document
            .create_element("div")
            .map_err(js_err)?
            .dyn_into()
            .map_err(|_| HookError::Unavailable("html element"))?;
        el.set_id(&bullet_dom_id(bullet.id));
        el.set_class_name("lol-bullet");
        el.set_text_content(Some(&bullet.symbol.to_string()));

        // Flight keyframes live in the stylesheet and read --travel
        let style = el.style();
        style.set_property("left", &format!("{}px", bullet.origin.x)).map_err(js_err)?;
        style.set_property("top", &format!("{}px", bullet.origin.y)).map_err(js_err)?;
        style.set_property("--travel", &format!("{}px", bullet.travel)).map_err(js_err)?;
        style
            .set_property(
                "animation",
                &format!("bullet-fly {}ms linear forwards", bullet.duration_ms),
            )
            .map_err(js_err)?;

        self.bullet_layer()?.append_child(&el).map_err(js_err)?;
        Ok(())
    }

    fn remove_bullet(&mut self, id: BulletId) -> Result<(), HookError> {
        if let Some(el) = self.document.get_element_by_id(&bullet_dom_id(id)) {
            el.remove();
        }
        Ok(())
    }

    fn face_origin(&self) -> Option<FaceOrigin> {
        let rect = self.face_element()?.get_bounding_client_rect();
        let size = Vec2::new(rect.width() as f32, rect.height() as f32);
        let top_left = Vec2::new(rect.left() as f32, rect.top() as f32);
        Some(FaceOrigin {
            center: top_left + size * 0.5,
            size,
            // The bounding rect already includes the container transform
            transform: Default::default(),
        })
    }

    fn viewport(&self) -> Vec2 {
        let dim = |v: Result<JsValue, JsValue>| v.ok().and_then(|v| v.as_f64()).unwrap_or(0.0) as f32;
        Vec2::new(dim(self.window.inner_width()), dim(self.window.inner_height()))
    }
}

/// Classifies points with `elementFromPoint`
pub struct DomHitTester {
    document: Document,
}

impl DomHitTester {
    pub fn new(document: Document) -> Self {
        Self { document }
    }

    fn is_control(el: &Element) -> bool {
        CONTROL_SELECTORS
            .iter()
            .any(|sel| matches!(el.closest(sel), Ok(Some(_))))
    }
}

impl HitTester for DomHitTester {
    fn hit_test(&self, point: Vec2) -> HitTarget {
        let Some(el) = self.document.element_from_point(point.x, point.y) else {
            return HitTarget::Nothing;
        };
        let tag = el.tag_name();
        let classes = el.class_list();
        HitTarget::classify(ElementFacts {
            tag: &tag,
            inside_control: Self::is_control(&el),
            inside_face: matches!(el.closest(FACE_SELECTOR), Ok(Some(_))),
            inside_main: matches!(el.closest("main"), Ok(Some(_))),
            has_background_class: BACKGROUND_CLASSES.iter().any(|c| classes.contains(c)),
        })
    }
}
