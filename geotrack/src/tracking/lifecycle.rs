//! App lifecycle bridge.
//!
//! Forwards the two lifecycle transitions the controller cares about and
//! drops every other notification.

use tracing::trace;

use super::event::{ControllerEvent, EventSink, LifecycleTransition};

/// Application lifecycle notifications as delivered by the OS.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppLifecycleNotification {
    WillResignActive,
    DidEnterBackground,
    WillEnterForeground,
    DidBecomeActive,
    WillTerminate,
}

impl AppLifecycleNotification {
    /// The controller transition this notification maps to, if any.
    pub fn transition(&self) -> Option<LifecycleTransition> {
        match self {
            Self::DidEnterBackground => Some(LifecycleTransition::EnteredBackground),
            Self::WillEnterForeground => Some(LifecycleTransition::EnteringForeground),
            Self::WillResignActive | Self::DidBecomeActive | Self::WillTerminate => None,
        }
    }
}

/// Stateless adapter from OS lifecycle notifications to controller events.
#[derive(Debug, Clone)]
pub struct LifecycleBridge {
    sink: EventSink,
}

impl LifecycleBridge {
    pub fn new(sink: EventSink) -> Self {
        Self { sink }
    }

    /// Forward a notification. Returns true if an event was posted.
    pub fn notify(&self, notification: AppLifecycleNotification) -> bool {
        match notification.transition() {
            Some(transition) => self.sink.post(ControllerEvent::Lifecycle(transition)),
            None => {
                trace!(?notification, "Lifecycle notification not forwarded");
                false
            }
        }
    }

    pub fn on_enter_background(&self) -> bool {
        self.notify(AppLifecycleNotification::DidEnterBackground)
    }

    pub fn on_enter_foreground(&self) -> bool {
        self.notify(AppLifecycleNotification::WillEnterForeground)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tracking::event::event_channel;

    #[test]
    fn test_forwards_only_two_transitions() {
        let (sink, mut rx) = event_channel();
        let bridge = LifecycleBridge::new(sink);

        assert!(!bridge.notify(AppLifecycleNotification::WillResignActive));
        assert!(bridge.notify(AppLifecycleNotification::DidEnterBackground));
        assert!(!bridge.notify(AppLifecycleNotification::DidBecomeActive));
        assert!(bridge.on_enter_foreground());
        assert!(!bridge.notify(AppLifecycleNotification::WillTerminate));

        assert!(matches!(
            rx.try_recv(),
            Ok(ControllerEvent::Lifecycle(LifecycleTransition::EnteredBackground))
        ));
        assert!(matches!(
            rx.try_recv(),
            Ok(ControllerEvent::Lifecycle(LifecycleTransition::EnteringForeground))
        ));
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_closed_controller_reports_false() {
        let (sink, rx) = event_channel();
        drop(rx);
        let bridge = LifecycleBridge::new(sink);
        assert!(!bridge.on_enter_background());
    }
}
