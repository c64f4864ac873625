//! Viewer abstraction. A viewer advertises what it can do once at startup;
//! the loop skips anything it does not support.

mod headless;
#[cfg(feature = "rerun")]
mod recording;

use humanoid_physics::BasePose;
use thiserror::Error;

pub use headless::HeadlessViewer;
#[cfg(feature = "rerun")]
pub use recording::RerunViewer;

pub const MIN_CAMERA_DISTANCE: f32 = 0.5;
pub const MAX_CAMERA_DISTANCE: f32 = 10.0;
/// Elevation limit, ±89°.
pub const MAX_CAMERA_ELEVATION: f32 = 89.0 * std::f32::consts::PI / 180.0;

#[derive(Error, Debug)]
pub enum ViewerError {
    #[error("viewer backend: {0}")]
    Backend(String),
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ViewerCapabilities {
    pub camera_tracking: bool,
    pub contact_overlay: bool,
    pub force_overlay: bool,
}

/// Orbit camera around the tracked body. Angles in radians.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct CameraPose {
    pub angle: f32,
    pub elevation: f32,
    pub distance: f32,
}

impl CameraPose {
    /// Pose used when tracking is switched back on.
    pub const TRACKING_DEFAULT: CameraPose = CameraPose {
        angle: 0.0,
        elevation: -0.15,
        distance: 3.0,
    };
}

impl Default for CameraPose {
    fn default() -> Self {
        Self {
            angle: 299.8f32.to_radians(),
            elevation: (-8.6f32).to_radians(),
            distance: 3.40,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum CameraAdjust {
    Rotate(f32),
    Zoom(f32),
    Tilt(f32),
}

/// Everything the operator can change about the view.
#[derive(Clone, Debug, PartialEq)]
pub struct ViewerSettings {
    pub track_base: bool,
    pub show_contacts: bool,
    pub show_forces: bool,
    pub camera: CameraPose,
}

impl Default for ViewerSettings {
    fn default() -> Self {
        Self {
            track_base: true,
            show_contacts: false,
            show_forces: false,
            camera: CameraPose::default(),
        }
    }
}

impl ViewerSettings {
    pub fn adjust(&mut self, adjust: CameraAdjust) {
        let camera = &mut self.camera;
        match adjust {
            CameraAdjust::Rotate(delta) => {
                camera.angle = (camera.angle + delta).rem_euclid(std::f32::consts::TAU);
            }
            CameraAdjust::Zoom(delta) => {
                camera.distance =
                    (camera.distance + delta).clamp(MIN_CAMERA_DISTANCE, MAX_CAMERA_DISTANCE);
            }
            CameraAdjust::Tilt(delta) => {
                camera.elevation =
                    (camera.elevation + delta).clamp(-MAX_CAMERA_ELEVATION, MAX_CAMERA_ELEVATION);
            }
        }
    }

    /// Returns the new state. Re-enabling tracking recenters the camera.
    pub fn toggle_tracking(&mut self) -> bool {
        self.track_base = !self.track_base;
        if self.track_base {
            self.camera = CameraPose::TRACKING_DEFAULT;
        }
        self.track_base
    }

    pub fn toggle_contacts(&mut self) -> bool {
        self.show_contacts = !self.show_contacts;
        self.show_contacts
    }

    pub fn toggle_forces(&mut self) -> bool {
        self.show_forces = !self.show_forces;
        self.show_forces
    }
}

/// Applied disturbance, for force overlays.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ForceMarker {
    pub origin: [f32; 3],
    /// World-frame force (N).
    pub force: [f32; 3],
}

/// State handed to the viewer at the end of each tick.
#[derive(Clone, Debug)]
pub struct ViewerFrame<'a> {
    pub time: f32,
    pub base: BasePose,
    pub tracked_position: [f32; 3],
    pub disturbance: Option<ForceMarker>,
    pub settings: &'a ViewerSettings,
}

pub trait Viewer {
    fn capabilities(&self) -> ViewerCapabilities;

    /// `false` once the operator closed the window.
    fn is_running(&self) -> bool;

    fn sync(&mut self, frame: &ViewerFrame) -> Result<(), ViewerError>;
}
