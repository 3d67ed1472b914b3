//! Best-effort platform notifications.

use crate::Result;

/// Permission previously granted by the user for platform notifications.
#[non_exhaustive]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Permission {
    Granted,
    Denied,
    /// The user has not been asked yet
    #[default]
    Default,
}

/// Shows a native desktop notification.
///
/// The client only calls [`DesktopNotifier::show`] when
/// [`DesktopNotifier::permission`] is [`Permission::Granted`]. Errors are logged
/// and otherwise ignored.
pub trait DesktopNotifier: Send + Sync + 'static {
    fn permission(&self) -> Permission;

    fn show(&self, title: &str, body: &str) -> Result<()>;
}
