//! Per-post UI state.
//!
//! Manual mode gets a [`ButtonRegistry`]: one clickable widget per post
//! cycling `idle -> loading -> success|error -> idle`, where a successful
//! rewrite turns the idle button into a "show original" toggle. Auto mode gets
//! an [`IndicatorRegistry`] of passive loading/success/error indicators.
//!
//! Auto-reset timers are tied to the widget that scheduled them: removing or
//! replacing the widget cancels the timer and suppresses its effect.

pub mod button;
pub mod errors;
pub mod indicator;
mod widget;

pub use button::{
    ActionError, ButtonProps, ButtonRegistry, ButtonState, ButtonView, ClickOutcome, RewriteAction,
    ToggleAction, BUTTON_HOST_CLASS,
};
pub use errors::UiError;
pub use indicator::{IndicatorKind, IndicatorRegistry, INDICATOR_HOST_CLASS};
pub use widget::UiTimings;
