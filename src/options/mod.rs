//! Application options: typed frame settings, the optional initial display,
//! and an open map plugins extend during setup. Live changes are published
//! per option name.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::Rc;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};

use crate::display::DisplayFactory;
use crate::error::{AppError, Result};

pub const RAF_OPTION: &str = "raf";
pub const FPS_OPTION: &str = "fps";

/// Frame-pacing settings, loadable from JSON.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FrameOptions {
    /// Use the animation-frame strategy instead of compensated timeouts.
    pub raf: bool,
    /// Target frame rate for the timeout strategy. Zero means uncapped.
    pub fps: u32,
}

impl Default for FrameOptions {
    fn default() -> Self {
        Self { raf: true, fps: 60 }
    }
}

impl FrameOptions {
    /// Per-frame budget derived from `fps`; zero when uncapped.
    pub fn ms_per_frame(&self) -> f64 {
        ms_per_frame(self.fps)
    }
}

pub(crate) fn ms_per_frame(fps: u32) -> f64 {
    if fps == 0 { 0.0 } else { 1000.0 / f64::from(fps) }
}

/// Display created during preinit when the options fully describe it.
#[derive(Clone)]
pub struct InitialDisplay {
    pub id: String,
    pub factory: DisplayFactory,
    pub options: Value,
}

impl fmt::Debug for InitialDisplay {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InitialDisplay")
            .field("id", &self.id)
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}

/// Options supplied by the caller constructing an application.
#[derive(Debug, Clone, Default)]
pub struct AppOptions {
    pub frame: FrameOptions,
    pub display: Option<InitialDisplay>,
    pub extra: Map<String, Value>,
}

impl AppOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a JSON object. `raf` and `fps` land in [`FrameOptions`]; every
    /// other key is kept as an extra option.
    pub fn from_json(source: &str) -> Result<Self> {
        let value: Value = serde_json::from_str(source).map_err(|err| AppError::InvalidOption {
            name: "<root>".to_string(),
            reason: err.to_string(),
        })?;
        let Value::Object(mut object) = value else {
            return Err(AppError::InvalidOption {
                name: "<root>".to_string(),
                reason: "expected a JSON object".to_string(),
            });
        };
        let mut frame = FrameOptions::default();
        if let Some(raw) = object.remove(RAF_OPTION) {
            frame.raf = parse_raf(&raw)?;
        }
        if let Some(raw) = object.remove(FPS_OPTION) {
            frame.fps = parse_fps(&raw)?;
        }
        Ok(Self {
            frame,
            display: None,
            extra: object,
        })
    }

    pub fn with_fps(mut self, fps: u32) -> Self {
        self.frame.fps = fps;
        self
    }

    pub fn with_raf(mut self, raf: bool) -> Self {
        self.frame.raf = raf;
        self
    }

    pub fn with_display(mut self, display: InitialDisplay) -> Self {
        self.display = Some(display);
        self
    }

    pub fn with_option(mut self, name: impl Into<String>, value: Value) -> Self {
        self.extra.insert(name.into(), value);
        self
    }
}

type ChangeHandler = Rc<dyn Fn(&Value)>;

/// Live options owned by an application.
pub struct Options {
    values: RefCell<Map<String, Value>>,
    display: RefCell<Option<InitialDisplay>>,
    handlers: RefCell<Vec<(String, ChangeHandler)>>,
    finalized: Cell<bool>,
    destroyed: Cell<bool>,
}

impl fmt::Debug for Options {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Options")
            .field("values", &self.values.borrow())
            .field("finalized", &self.finalized.get())
            .finish_non_exhaustive()
    }
}

impl Options {
    pub fn new(options: AppOptions) -> Self {
        let AppOptions {
            frame,
            display,
            mut extra,
        } = options;
        extra.insert(RAF_OPTION.to_string(), json!(frame.raf));
        extra.insert(FPS_OPTION.to_string(), json!(frame.fps));
        Self {
            values: RefCell::new(extra),
            display: RefCell::new(display),
            handlers: RefCell::new(Vec::new()),
            finalized: Cell::new(false),
            destroyed: Cell::new(false),
        }
    }

    /// Declare an option with a default. A value supplied by the caller wins.
    pub fn define(&self, name: &str, default: Value) -> Result<()> {
        if self.finalized.get() {
            return Err(AppError::OptionsFinalized(name.to_string()));
        }
        self.values
            .borrow_mut()
            .entry(name.to_string())
            .or_insert(default);
        Ok(())
    }

    pub fn finalize(&self) {
        self.finalized.set(true);
    }

    pub fn is_finalized(&self) -> bool {
        self.finalized.get()
    }

    pub fn get(&self, name: &str) -> Option<Value> {
        self.values.borrow().get(name).cloned()
    }

    pub fn frame(&self) -> FrameOptions {
        let values = self.values.borrow();
        let defaults = FrameOptions::default();
        FrameOptions {
            raf: values
                .get(RAF_OPTION)
                .and_then(Value::as_bool)
                .unwrap_or(defaults.raf),
            fps: values
                .get(FPS_OPTION)
                .and_then(Value::as_u64)
                .and_then(|fps| u32::try_from(fps).ok())
                .unwrap_or(defaults.fps),
        }
    }

    /// Store `value` and notify every subscriber of `name`.
    pub fn set(&self, name: &str, value: Value) -> Result<()> {
        if self.destroyed.get() {
            return Ok(());
        }
        match name {
            RAF_OPTION => {
                parse_raf(&value)?;
            }
            FPS_OPTION => {
                parse_fps(&value)?;
            }
            _ => {}
        }
        self.values
            .borrow_mut()
            .insert(name.to_string(), value.clone());
        let handlers: Vec<ChangeHandler> = self
            .handlers
            .borrow()
            .iter()
            .filter(|(key, _)| key == name)
            .map(|(_, handler)| handler.clone())
            .collect();
        for handler in handlers {
            handler(&value);
        }
        Ok(())
    }

    pub fn set_fps(&self, fps: u32) -> Result<()> {
        self.set(FPS_OPTION, json!(fps))
    }

    pub fn set_raf(&self, raf: bool) -> Result<()> {
        self.set(RAF_OPTION, json!(raf))
    }

    pub fn on_change<F>(&self, name: &str, handler: F)
    where
        F: Fn(&Value) + 'static,
    {
        if self.destroyed.get() {
            return;
        }
        self.handlers
            .borrow_mut()
            .push((name.to_string(), Rc::new(handler)));
    }

    pub(crate) fn take_initial_display(&self) -> Option<InitialDisplay> {
        self.display.borrow_mut().take()
    }

    pub fn destroy(&self) {
        self.destroyed.set(true);
        self.handlers.borrow_mut().clear();
        self.values.borrow_mut().clear();
        self.display.borrow_mut().take();
    }
}

fn parse_raf(value: &Value) -> Result<bool> {
    value.as_bool().ok_or_else(|| AppError::InvalidOption {
        name: RAF_OPTION.to_string(),
        reason: format!("expected a boolean, got {value}"),
    })
}

fn parse_fps(value: &Value) -> Result<u32> {
    value
        .as_u64()
        .and_then(|fps| u32::try_from(fps).ok())
        .ok_or_else(|| AppError::InvalidOption {
            name: FPS_OPTION.to_string(),
            reason: format!("expected a non-negative integer, got {value}"),
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn json_splits_frame_and_extra_options() {
        let options = AppOptions::from_json(r#"{"raf": false, "fps": 30, "volume": 0.5}"#).unwrap();
        assert_eq!(options.frame, FrameOptions { raf: false, fps: 30 });
        assert_eq!(options.extra.get("volume"), Some(&json!(0.5)));
        assert!(options.extra.get("fps").is_none());
    }

    #[test]
    fn json_rejects_bad_frame_values() {
        let err = AppOptions::from_json(r#"{"fps": -1}"#).unwrap_err();
        assert!(matches!(err, AppError::InvalidOption { name, .. } if name == "fps"));
        assert!(AppOptions::from_json("[1, 2]").is_err());
    }

    #[test]
    fn frame_options_deserialize_with_defaults() {
        let frame: FrameOptions = serde_json::from_str(r#"{"fps": 24}"#).unwrap();
        assert!(frame.raf);
        assert_eq!(frame.ms_per_frame(), 1000.0 / 24.0);
        assert_eq!(FrameOptions { raf: false, fps: 0 }.ms_per_frame(), 0.0);
    }

    #[test]
    fn define_respects_caller_values_and_finalize() {
        let options = Options::new(AppOptions::new().with_option("captions", json!(true)));
        options.define("captions", json!(false)).unwrap();
        options.define("volume", json!(1.0)).unwrap();
        assert_eq!(options.get("captions"), Some(json!(true)));
        assert_eq!(options.get("volume"), Some(json!(1.0)));
        options.finalize();
        let err = options.define("late", json!(0)).unwrap_err();
        assert!(matches!(err, AppError::OptionsFinalized(name) if name == "late"));
    }

    #[test]
    fn set_notifies_subscribers_of_that_name() {
        let options = Options::new(AppOptions::new());
        let seen = Rc::new(RefCell::new(Vec::new()));
        let sink = seen.clone();
        options.on_change(FPS_OPTION, move |value| sink.borrow_mut().push(value.clone()));
        options.set_fps(30).unwrap();
        options.set_raf(false).unwrap();
        assert_eq!(*seen.borrow(), vec![json!(30)]);
        assert_eq!(options.frame(), FrameOptions { raf: false, fps: 30 });
        assert!(options.set(RAF_OPTION, json!("yes")).is_err());
    }

    #[test]
    fn destroy_drops_handlers_and_values() {
        let options = Options::new(AppOptions::new());
        options.on_change(FPS_OPTION, |_| panic!("handler survived destroy"));
        options.destroy();
        options.set_fps(10).unwrap();
        assert!(options.get(FPS_OPTION).is_none());
    }
}
