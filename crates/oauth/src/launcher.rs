//! Browser-launch boundary for presenting the authorization URL.

use std::io;

use tracing::info;

/// Capability for presenting an authorization URL to the user.
///
/// Launching a browser and surfacing the URL for manual use are equivalent
/// outcomes; the flow treats both as "presented".
pub trait BrowserLauncher: Send + Sync {
    fn open(&self, url: &str) -> io::Result<()>;
}

/// Opens the URL in the system default browser.
pub struct SystemBrowser;

impl BrowserLauncher for SystemBrowser {
    fn open(&self, url: &str) -> io::Result<()> {
        open::that(url)
    }
}

/// Surfaces the URL in the log, for hosts without a default-browser
/// mechanism.
pub struct UrlAnnouncer;

impl BrowserLauncher for UrlAnnouncer {
    fn open(&self, url: &str) -> io::Result<()> {
        info!(%url, "open this URL in a browser to continue authorization");
        Ok(())
    }
}
