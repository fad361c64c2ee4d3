use crossbeam_channel::{unbounded, Receiver, Sender};

use crate::config::coerce_bool;

/// Notifications from the host runtime.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum HostEvent {
    /// Logical viewport size and device pixel ratio changed.
    Resized { width: u32, height: u32, dpr: f32 },
    /// Host moved to the background (true) or back (false).
    VisibilityChanged { hidden: bool },
}

/// Commands from the UI layer.
#[derive(Debug, Clone, PartialEq)]
pub enum Control {
    Enable,
    Disable,
    ToggleSubjectReplacement,
    SetBlurRadius(String),
    SetMirror(bool),
    SetWhiteThreshold(String),
    SetSensitivity(f32),
    CaptureBackground,
    Shutdown,
}

impl Control {
    /// Parse one text command, e.g. `blur 12`, `mirror off`, `capture`.
    /// Numeric arguments are kept raw so the config setters apply their own
    /// coercion rules.
    pub fn parse(line: &str) -> Option<Self> {
        let mut parts = line.split_whitespace();
        let command = parts.next()?.to_ascii_lowercase();
        let arg = parts.next().unwrap_or("");
        let control = match command.as_str() {
            "enable" | "on" => Control::Enable,
            "disable" | "off" => Control::Disable,
            "toggle" | "cloak" => Control::ToggleSubjectReplacement,
            "blur" => Control::SetBlurRadius(arg.to_string()),
            "mirror" => Control::SetMirror(coerce_bool(arg)),
            "threshold" => Control::SetWhiteThreshold(arg.to_string()),
            "sensitivity" => Control::SetSensitivity(arg.parse().ok()?),
            "capture" | "bg" => Control::CaptureBackground,
            "quit" | "exit" => Control::Shutdown,
            _ => return None,
        };
        Some(control)
    }
}

/// Sending half of the host interface. Cloneable; every send reports whether
/// the effect is still listening (false after teardown).
#[derive(Debug, Clone)]
pub struct HostLink {
    events: Sender<HostEvent>,
    controls: Sender<Control>,
}

impl HostLink {
    pub fn resize(&self, width: u32, height: u32, dpr: f32) -> bool {
        self.events
            .send(HostEvent::Resized { width, height, dpr })
            .is_ok()
    }

    pub fn set_hidden(&self, hidden: bool) -> bool {
        self.events
            .send(HostEvent::VisibilityChanged { hidden })
            .is_ok()
    }

    pub fn send(&self, control: Control) -> bool {
        self.controls.send(control).is_ok()
    }
}

/// Receiving half, owned by the effect and dropped on teardown.
pub(crate) struct HostInbox {
    pub(crate) events: Receiver<HostEvent>,
    pub(crate) controls: Receiver<Control>,
}

pub(crate) fn channel() -> (HostLink, HostInbox) {
    let (event_tx, event_rx) = unbounded();
    let (control_tx, control_rx) = unbounded();
    (
        HostLink {
            events: event_tx,
            controls: control_tx,
        },
        HostInbox {
            events: event_rx,
            controls: control_rx,
        },
    )
}
