//! macOS window and capture primitives.

use objc::runtime::{Class, Object};
use objc::{msg_send, sel, sel_impl};
use tokio::process::Command;

use crate::window::WindowInfo;
use crate::{Result, ScreenError};

/// Look up the active window: owning process via NSWorkspace, window
/// title via System Events (titles are not exposed through NSWorkspace).
pub async fn active_window() -> Result<WindowInfo> {
    let process = frontmost_app_name()
        .ok_or_else(|| ScreenError::WindowLookup("no frontmost application".into()))?;
    let title = front_window_title().await.unwrap_or_default();
    Ok(WindowInfo { title, process })
}

/// Name of the frontmost application via NSWorkspace.frontmostApplication.
fn frontmost_app_name() -> Option<String> {
    unsafe {
        let workspace_class = Class::get("NSWorkspace")?;
        let shared_workspace: *mut Object = msg_send![workspace_class, sharedWorkspace];
        if shared_workspace.is_null() {
            return None;
        }

        let frontmost_app: *mut Object = msg_send![shared_workspace, frontmostApplication];
        if frontmost_app.is_null() {
            return None;
        }

        let name_ns: *mut Object = msg_send![frontmost_app, localizedName];
        nsstring_to_string(name_ns).filter(|name| !name.is_empty())
    }
}

/// Convert NSString to Rust String.
unsafe fn nsstring_to_string(nsstring: *mut Object) -> Option<String> {
    if nsstring.is_null() {
        return None;
    }
    let c_str: *const std::os::raw::c_char = msg_send![nsstring, UTF8String];
    if c_str.is_null() {
        return None;
    }
    let rust_str = std::ffi::CStr::from_ptr(c_str).to_str().ok()?;
    Some(rust_str.to_string())
}

/// Title of the frontmost window via System Events. Requires Automation
/// permission; returns None when denied or when the app has no window.
async fn front_window_title() -> Option<String> {
    let script = r#"
        tell application "System Events"
            set frontApp to first application process whose frontmost is true
            try
                return name of front window of frontApp
            end try
        end tell
        return ""
    "#;

    let output = Command::new("osascript")
        .args(["-e", script])
        .output()
        .await
        .ok()?;
    if !output.status.success() {
        return None;
    }

    let title = String::from_utf8_lossy(&output.stdout).trim().to_string();
    if title.is_empty() {
        None
    } else {
        Some(title)
    }
}

/// Bounds of the frontmost window as "x,y,w,h" for `screencapture -R`.
pub async fn front_window_bounds() -> Option<String> {
    let script = r#"
        tell application "System Events"
            set frontApp to first application process whose frontmost is true
            try
                set pos to position of front window of frontApp
                set sz to size of front window of frontApp
                return ((item 1 of pos) as text) & "," & ((item 2 of pos) as text) & "," & ((item 1 of sz) as text) & "," & ((item 2 of sz) as text)
            end try
        end tell
        return ""
    "#;

    let output = Command::new("osascript")
        .args(["-e", script])
        .output()
        .await
        .ok()?;
    if !output.status.success() {
        return None;
    }

    let bounds = String::from_utf8_lossy(&output.stdout).trim().to_string();
    if bounds.split(',').count() == 4 {
        Some(bounds)
    } else {
        None
    }
}
