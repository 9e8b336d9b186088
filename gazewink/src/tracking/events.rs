//! Events emitted by the tracker to subscribers.

/// A named tracker event, optionally carrying a payload.
#[derive(Debug, Clone, PartialEq)]
pub enum GazeEvent {
    /// Eye pair accepted as open after being closed for `duration_ms`.
    Open { duration_ms: f64 },
    /// Eye pair accepted as closed after being open for `duration_ms`.
    Close { duration_ms: f64 },
    Blink,
    DoubleBlink,
    /// Generic wink, emitted alongside the eye-specific one.
    Wink,
    LeftWink,
    RightWink,
    /// Gaze entered an element.
    Gaze { element: u64 },
    /// Gaze left an element.
    GazeLeave { element: u64 },
}

impl GazeEvent {
    /// Subscriber-facing event name.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Open { .. } => "open",
            Self::Close { .. } => "close",
            Self::Blink => "blink",
            Self::DoubleBlink => "doubleblink",
            Self::Wink => "wink",
            Self::LeftWink => "leftwink",
            Self::RightWink => "rightwink",
            Self::Gaze { .. } => "gaze",
            Self::GazeLeave { .. } => "gazeleave",
        }
    }

    /// The element this event refers to, for gaze events.
    pub fn element(&self) -> Option<u64> {
        match self {
            Self::Gaze { element } | Self::GazeLeave { element } => Some(*element),
            _ => None,
        }
    }

    /// Serialize the event as an IPC s-expression.
    pub fn to_sexp(&self) -> String {
        match self {
            Self::Open { duration_ms } | Self::Close { duration_ms } => format!(
                "(:type :event :event :{} :duration-ms {:.0})",
                self.name(),
                duration_ms
            ),
            Self::Gaze { element } | Self::GazeLeave { element } => format!(
                "(:type :event :event :{} :element {})",
                self.name(),
                element
            ),
            _ => format!("(:type :event :event :{})", self.name()),
        }
    }
}
