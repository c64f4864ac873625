use super::{Viewer, ViewerCapabilities, ViewerError, ViewerFrame};

const APP_ID: &str = "humanoid-deploy";

/// Streams the base pose, tracked body and disturbance arrow to a spawned
/// Rerun viewer. The viewer owns its camera, so tracking is not offered.
pub struct RerunViewer {
    stream: rerun::RecordingStream,
}

impl RerunViewer {
    pub fn spawn() -> Result<Self, ViewerError> {
        let stream = rerun::RecordingStreamBuilder::new(APP_ID)
            .spawn()
            .map_err(|e| ViewerError::Backend(e.to_string()))?;
        log::info!("Rerun viewer spawned");
        Ok(Self { stream })
    }
}

impl Viewer for RerunViewer {
    fn capabilities(&self) -> ViewerCapabilities {
        ViewerCapabilities {
            force_overlay: true,
            ..ViewerCapabilities::default()
        }
    }

    fn is_running(&self) -> bool {
        true
    }

    fn sync(&mut self, frame: &ViewerFrame) -> Result<(), ViewerError> {
        let err = |e: rerun::RecordingStreamError| ViewerError::Backend(e.to_string());
        self.stream.set_time_seconds("sim_time", frame.time as f64);

        let [w, x, y, z] = frame.base.orientation;
        self.stream
            .log(
                "robot/base",
                &rerun::Transform3D::from_translation_rotation(
                    frame.base.position,
                    rerun::Quaternion::from_xyzw([x, y, z, w]),
                ),
            )
            .map_err(err)?;
        self.stream
            .log(
                "robot/tracked",
                &rerun::Points3D::new([frame.tracked_position]).with_radii([0.03]),
            )
            .map_err(err)?;

        if let Some(marker) = frame.disturbance.filter(|_| frame.settings.show_forces) {
            // 100 N draws as half a meter
            let arrow = marker.force.map(|f| f * 0.005);
            self.stream
                .log(
                    "robot/disturbance",
                    &rerun::Arrows3D::from_vectors([arrow]).with_origins([marker.origin]),
                )
                .map_err(err)?;
        } else {
            self.stream.log("robot/disturbance", &rerun::Clear::flat()).map_err(err)?;
        }
        Ok(())
    }
}
