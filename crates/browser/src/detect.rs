//! Browser and driver binary resolution.

use std::path::PathBuf;

use crate::error::SessionError;

/// Chromium-flavoured executable names to search on PATH. All speak CDP.
const CHROMIUM_EXECUTABLES: &[&str] = &[
    "google-chrome",
    "google-chrome-stable",
    "chromium",
    "chromium-browser",
    "chrome",
    "msedge",
    "brave-browser",
];

#[cfg(target_os = "macos")]
const MACOS_APP_PATHS: &[&str] = &[
    "/Applications/Google Chrome.app/Contents/MacOS/Google Chrome",
    "/Applications/Chromium.app/Contents/MacOS/Chromium",
    "/Applications/Microsoft Edge.app/Contents/MacOS/Microsoft Edge",
    "/Applications/Brave Browser.app/Contents/MacOS/Brave Browser",
];

#[cfg(target_os = "windows")]
const WINDOWS_PATHS: &[&str] = &[
    r"C:\Program Files\Google\Chrome\Application\chrome.exe",
    r"C:\Program Files (x86)\Google\Chrome\Application\chrome.exe",
    r"C:\Program Files (x86)\Microsoft\Edge\Application\msedge.exe",
];

/// Resolve the Chromium binary for direct launches.
///
/// Checks, in order: the configured path, the `CHROME` environment variable,
/// platform install locations, then known executable names on PATH.
pub fn resolve_chromium(custom_path: Option<&str>) -> Result<PathBuf, SessionError> {
    if let Some(path) = custom_path {
        let p = PathBuf::from(path);
        if p.exists() {
            return Ok(p);
        }
        return Err(SessionError::BrowserNotAvailable(format!(
            "configured chrome path does not exist: {path}"
        )));
    }

    if let Ok(path) = std::env::var("CHROME") {
        let p = PathBuf::from(&path);
        if p.exists() {
            return Ok(p);
        }
    }

    // Install locations are checked before PATH; PATH can carry broken
    // wrapper scripts.
    #[cfg(target_os = "macos")]
    for path in MACOS_APP_PATHS {
        let p = PathBuf::from(path);
        if p.exists() {
            return Ok(p);
        }
    }

    #[cfg(target_os = "windows")]
    for path in WINDOWS_PATHS {
        let p = PathBuf::from(path);
        if p.exists() {
            return Ok(p);
        }
    }

    for name in CHROMIUM_EXECUTABLES {
        if let Ok(path) = which::which(name) {
            return Ok(path);
        }
    }

    Err(SessionError::BrowserNotAvailable(
        "no Chromium-based browser found; install one (chrome, chromium, edge, brave), \
         set the CHROME environment variable, or configure chrome_path"
            .to_string(),
    ))
}

/// Resolve the driver binary for driver-variant launches.
pub fn resolve_driver(custom_path: Option<&str>) -> Result<PathBuf, SessionError> {
    if let Some(path) = custom_path {
        let p = PathBuf::from(path);
        if p.exists() {
            return Ok(p);
        }
        return Err(SessionError::BrowserNotAvailable(format!(
            "configured driver path does not exist: {path}"
        )));
    }

    if let Ok(path) = std::env::var("CHROMEDRIVER") {
        let p = PathBuf::from(&path);
        if p.exists() {
            return Ok(p);
        }
    }

    which::which("chromedriver").map_err(|_| {
        SessionError::BrowserNotAvailable(
            "chromedriver not found on PATH; install it or configure driver_path".to_string(),
        )
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn custom_chrome_path_takes_precedence() {
        let temp_dir = std::env::temp_dir();
        let fake = temp_dir.join("fake-chrome-for-detect-test");
        std::fs::write(&fake, "fake").unwrap();

        let resolved = resolve_chromium(Some(fake.to_str().unwrap())).unwrap();
        assert_eq!(resolved, fake);

        std::fs::remove_file(&fake).unwrap();
    }

    #[test]
    fn missing_custom_chrome_path_errors() {
        let result = resolve_chromium(Some("/nonexistent/path/to/chrome"));
        assert!(matches!(result, Err(SessionError::BrowserNotAvailable(_))));
    }

    #[test]
    fn missing_custom_driver_path_errors() {
        let result = resolve_driver(Some("/nonexistent/path/to/chromedriver"));
        assert!(matches!(result, Err(SessionError::BrowserNotAvailable(_))));
    }

    #[test]
    fn executable_list_covers_chrome_and_chromium() {
        assert!(CHROMIUM_EXECUTABLES.contains(&"google-chrome"));
        assert!(CHROMIUM_EXECUTABLES.contains(&"chromium"));
    }
}
