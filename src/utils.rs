use std::ffi::CStr;

/// Compiled-in window size. Resizing is disabled for now, so this doubles as
/// the preferred swapchain extent whenever the surface lets the window decide.
pub const WINDOW_WIDTH: u32 = 800;
pub const WINDOW_HEIGHT: u32 = 600;

/// Application identity handed through to the Vulkan driver.
pub struct GameInfo {
    pub app_name: &'static CStr,
    pub major: u32,
    pub minor: u32,
    pub patch: u32,
}

#[allow(dead_code)]
impl Default for GameInfo {
    fn default() -> Self {
        Self {
            app_name: c"",
            major: 0,
            minor: 0,
            patch: 0,
        }
    }
}
