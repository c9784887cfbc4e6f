//! 24-bit RGB colors for plain terminal output.

use owo_colors::Rgb;

use crate::backend::Stage;

#[derive(Debug, Clone, Copy)]
pub struct Theme {
    /// Finished - green (34, 197, 94)
    pub success: Rgb,
    /// Failures - red (239, 68, 68)
    pub error: Rgb,
    /// Retries - yellow (234, 179, 8)
    pub warning: Rgb,
    /// Stage labels - cyan (34, 211, 238)
    pub stage: Rgb,
    /// Secondary text - gray (107, 114, 128)
    pub muted: Rgb,
}

impl Default for Theme {
    fn default() -> Self {
        Self {
            success: Rgb(34, 197, 94),
            error: Rgb(239, 68, 68),
            warning: Rgb(234, 179, 8),
            stage: Rgb(34, 211, 238),
            muted: Rgb(107, 114, 128),
        }
    }
}

impl Theme {
    pub fn new() -> Self {
        Self::default()
    }

    /// Label color of a stage; the last stage reads as success.
    pub fn stage_color(&self, stage: Stage) -> Rgb {
        if stage.is_terminal() {
            self.success
        } else {
            self.stage
        }
    }
}
