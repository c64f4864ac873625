//! Fixed-position terminal status block, redrawn every control tick.

use std::io::{self, Write};

use crossterm::{
    cursor, queue,
    style::{Print, PrintStyledContent, Stylize},
    terminal::{Clear, ClearType},
};

use crate::command::Mode;
use crate::viewer::CameraPose;

const RULE_WIDTH: usize = 70;
const BLOCK_LINES: u16 = 4;
/// EMA weight of the newest velocity sample.
const VELOCITY_FILTER_ALPHA: f32 = 0.3;

/// Everything shown in the status block for one refresh.
#[derive(Clone, Copy, Debug)]
pub struct StatusSnapshot {
    pub command: [f32; 3],
    /// Measured body-frame `[vx, vy, wz]`.
    pub measured: [f32; 3],
    pub mode: Mode,
    pub tracking: bool,
    pub show_forces: bool,
    pub show_contacts: bool,
    pub reset_pending: bool,
    pub camera: CameraPose,
    /// Disturbance force magnitude (N).
    pub disturbance: f32,
}

pub struct StatusDisplay {
    out: Box<dyn Write + Send>,
    filtered: Option<[f32; 3]>,
    message: Option<String>,
    drawn: bool,
}

impl StatusDisplay {
    pub fn new(out: Box<dyn Write + Send>) -> Self {
        Self {
            out,
            filtered: None,
            message: None,
            drawn: false,
        }
    }

    pub fn stdout() -> Self {
        Self::new(Box::new(io::stdout()))
    }

    /// Formats but discards output.
    pub fn hidden() -> Self {
        Self::new(Box::new(io::sink()))
    }

    /// Queues a one-shot info line for the next refresh.
    pub fn post(&mut self, message: impl Into<String>) {
        self.message = Some(message.into());
    }

    pub fn pending_message(&self) -> Option<&str> {
        self.message.as_deref()
    }

    pub fn reset_filter(&mut self) {
        self.filtered = None;
    }

    /// Builds the four status lines. Updates the velocity filter and consumes
    /// the pending message.
    pub fn lines(&mut self, status: &StatusSnapshot) -> [String; 4] {
        let filtered = match self.filtered {
            None => status.measured,
            Some(prev) => std::array::from_fn(|i| {
                VELOCITY_FILTER_ALPHA * status.measured[i] + (1.0 - VELOCITY_FILTER_ALPHA) * prev[i]
            }),
        };
        self.filtered = Some(filtered);
        let cmd = status.command;
        let err: [f32; 3] = std::array::from_fn(|i| filtered[i] - cmd[i]);

        let velocity = format!(
            "  Velocity:  Cmd=[{:6.3}, {:6.3}, {:6.3}]  Act=[{:6.3}, {:6.3}, {:6.3}]  Err=[{:6.3}, {:6.3}, {:6.3}]",
            cmd[0], cmd[1], cmd[2], filtered[0], filtered[1], filtered[2], err[0], err[1], err[2]
        );

        let mut parts = vec![format!("Mode:{}({})", status.mode.name(), status.mode.index())];
        for (on, label) in [
            (status.tracking, "Y:Track"),
            (status.show_forces, "X:Force"),
            (status.show_contacts, "A:Contact"),
            (status.reset_pending, "B:Reset"),
        ] {
            if on {
                parts.push(label.to_string());
            }
        }
        let mode = format!("  {}", parts.join(" | "));

        let mut camera = format!(
            "  Camera: Angle={:6.1}° Elev={:6.1}° Dist={:5.2}m",
            status.camera.angle.to_degrees(),
            status.camera.elevation.to_degrees(),
            status.camera.distance
        );
        if status.disturbance > 1e-6 {
            camera.push_str(&format!(" | Disturbance: {:6.2}N", status.disturbance));
        }

        let info = self
            .message
            .take()
            .map(|m| format!("  Info: {}", m))
            .unwrap_or_default();

        [velocity, mode, camera, info]
    }

    pub fn render(&mut self, status: &StatusSnapshot) -> io::Result<()> {
        let lines = self.lines(status);
        if self.drawn {
            queue!(self.out, cursor::MoveToPreviousLine(BLOCK_LINES))?;
        } else {
            write_banner(&mut self.out, "Robot Status Display")?;
            self.drawn = true;
        }
        for line in lines {
            queue!(
                self.out,
                Clear(ClearType::CurrentLine),
                Print(line),
                cursor::MoveToNextLine(1)
            )?;
        }
        self.out.flush()
    }
}

/// Rule, centered bold title, rule.
pub fn write_banner(out: &mut impl Write, title: &str) -> io::Result<()> {
    let rule = "=".repeat(RULE_WIDTH);
    let pad = RULE_WIDTH.saturating_sub(title.len()) / 2;
    queue!(
        out,
        cursor::MoveToNextLine(1),
        Print(&rule),
        cursor::MoveToNextLine(1),
        Print(" ".repeat(pad)),
        PrintStyledContent(title.bold()),
        cursor::MoveToNextLine(1),
        Print(&rule),
        cursor::MoveToNextLine(1)
    )
}
