//! Debug image sink.
//!
//! Renders each grid snapshot published by the exploration loop to a PNG so
//! a run can be inspected frame by frame.  The sink is a plain bus
//! subscriber; the loop does not know it exists.
//!
//! Colour key: unknown white, free gray, occupied black, frontier cells
//! green, robot a red 7×7 block with a blue heading ray, current goal yellow.
//! Image row `r` is grid row `r`.

use std::path::{Path, PathBuf};

use image::{Rgb, RgbImage};
use scout_middleware::EventBus;
use scout_perception::transform::world_to_grid;
use scout_perception::{FrontierDetector, OccupancyGrid};
use scout_types::{CellState, EventPayload, GridCell, GridPose};
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

const UNKNOWN: Rgb<u8> = Rgb([255, 255, 255]);
const FREE: Rgb<u8> = Rgb([125, 125, 125]);
const OCCUPIED: Rgb<u8> = Rgb([0, 0, 0]);
const FRONTIER: Rgb<u8> = Rgb([30, 250, 10]);
const ROBOT: Rgb<u8> = Rgb([255, 0, 0]);
const HEADING: Rgb<u8> = Rgb([0, 0, 255]);
const GOAL: Rgb<u8> = Rgb([255, 220, 0]);

const ROBOT_HALF_SIZE: i64 = 3;
const HEADING_LENGTH: u32 = 10;

/// Draw one snapshot.
pub fn render_snapshot(grid: &OccupancyGrid, robot: GridPose, goal: Option<GridCell>) -> RgbImage {
    let mut img = RgbImage::from_pixel(grid.width() as u32, grid.height() as u32, UNKNOWN);

    for (cell, state) in grid.cells() {
        let colour = match state {
            CellState::Unknown => continue,
            CellState::Free => FREE,
            CellState::Occupied => OCCUPIED,
        };
        put(&mut img, cell.row, cell.col, colour);
    }
    for cell in FrontierDetector::new(grid).all_frontiers() {
        put(&mut img, cell.row, cell.col, FRONTIER);
    }

    if let Some(goal) = goal {
        for dr in -1..=1 {
            for dc in -1..=1 {
                put(&mut img, goal.row + dr, goal.col + dc, GOAL);
            }
        }
    }

    let centre = robot.to_cell();
    for dr in -ROBOT_HALF_SIZE..=ROBOT_HALF_SIZE {
        for dc in -ROBOT_HALF_SIZE..=ROBOT_HALF_SIZE {
            put(&mut img, centre.row + dr, centre.col + dc, ROBOT);
        }
    }
    let (sin, cos) = robot.theta.sin_cos();
    for step in 1..=HEADING_LENGTH {
        let t = f64::from(step);
        let col = centre.col + (t * cos).round() as i64;
        let row = centre.row + (t * sin).round() as i64;
        put(&mut img, row, col, HEADING);
    }
    img
}

/// Set a pixel, ignoring coordinates outside the image.
fn put(img: &mut RgbImage, row: i64, col: i64, colour: Rgb<u8>) {
    if row < 0 || col < 0 || row >= i64::from(img.height()) || col >= i64::from(img.width()) {
        return;
    }
    img.put_pixel(col as u32, row as u32, colour);
}

struct PendingFrame {
    cycle: u64,
    grid: OccupancyGrid,
    robot: GridPose,
}

/// Writes `cycle_NNNN.png` into a directory for every snapshot on the bus.
///
/// A snapshot is held back until the goal planned from it is issued, so the
/// image shows the goal too.  Frames with no goal (the final one) are
/// written without it.
pub struct DebugImageSink;

impl DebugImageSink {
    /// Subscribe to `bus` and start writing images into `dir`.
    ///
    /// The task ends when the exploration run finishes or the bus closes and
    /// yields the number of images written.
    pub fn spawn(bus: &EventBus, dir: impl Into<PathBuf>) -> JoinHandle<usize> {
        let mut rx = bus.subscribe();
        let dir = dir.into();

        tokio::spawn(async move {
            if let Err(e) = tokio::fs::create_dir_all(&dir).await {
                warn!(dir = %dir.display(), error = %e, "cannot create debug image directory");
                return 0;
            }

            let mut written = 0;
            let mut pending: Option<PendingFrame> = None;
            loop {
                let payload = match rx.recv().await {
                    Ok(event) => event.payload,
                    Err(RecvError::Lagged(skipped)) => {
                        warn!(skipped, "debug image sink lagging; frames dropped");
                        continue;
                    }
                    Err(RecvError::Closed) => break,
                };
                match payload {
                    EventPayload::Snapshot {
                        cycle,
                        metadata,
                        origin,
                        cells,
                        robot,
                    } => {
                        if let Some(frame) = pending.take() {
                            written += write_frame(&dir, frame, None).await;
                        }
                        match OccupancyGrid::new(metadata, origin, &cells) {
                            Ok(grid) => {
                                let robot = world_to_grid(robot, origin, &metadata);
                                pending = Some(PendingFrame { cycle, grid, robot });
                            }
                            Err(e) => warn!(cycle, error = %e, "undecodable snapshot"),
                        }
                    }
                    EventPayload::GoalIssued(goal) => {
                        if let Some(frame) = pending.take() {
                            written += write_frame(&dir, frame, Some(goal.cell)).await;
                        }
                    }
                    EventPayload::Finished(_) => break,
                    _ => {}
                }
            }
            if let Some(frame) = pending.take() {
                written += write_frame(&dir, frame, None).await;
            }
            written
        })
    }
}

/// Returns 1 when the image was written, 0 otherwise.
async fn write_frame(dir: &Path, frame: PendingFrame, goal: Option<GridCell>) -> usize {
    let path = dir.join(format!("cycle_{:04}.png", frame.cycle));
    let img = render_snapshot(&frame.grid, frame.robot, goal);
    let target = path.clone();
    match tokio::task::spawn_blocking(move || img.save(&target)).await {
        Ok(Ok(())) => {
            debug!(path = %path.display(), "debug image written");
            1
        }
        Ok(Err(e)) => {
            warn!(path = %path.display(), error = %e, "failed to write debug image");
            0
        }
        Err(e) => {
            warn!(error = %e, "debug image writer panicked");
            0
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use scout_types::{Event, GridMetadata, LoopReport, Pose2D, Termination};

    fn grid_with_unknown_column() -> OccupancyGrid {
        // 20x12; column 19 unknown, row 0 occupied, rest free.
        let (w, h) = (20, 12);
        let mut raw = vec![CellState::RAW_FREE; w * h];
        for r in 0..h {
            raw[r * w + 19] = CellState::RAW_UNKNOWN;
        }
        for c in 0..w - 1 {
            raw[c] = CellState::RAW_OCCUPIED;
        }
        OccupancyGrid::new(GridMetadata::new(w, h, 1.0), Pose2D::default(), &raw).unwrap()
    }

    #[test]
    fn render_uses_colour_key() {
        let grid = grid_with_unknown_column();
        let img = render_snapshot(&grid, GridPose::new(5, 6, 0.0), Some(GridCell::new(10, 17)));

        assert_eq!(img.dimensions(), (20, 12));
        assert_eq!(*img.get_pixel(19, 5), UNKNOWN);
        assert_eq!(*img.get_pixel(0, 0), OCCUPIED);
        assert_eq!(*img.get_pixel(1, 11), FREE);
        // Column 18 borders the unknown column.
        assert_eq!(*img.get_pixel(18, 3), FRONTIER);
        // Robot block centred on (row 6, col 5).
        assert_eq!(*img.get_pixel(5, 6), ROBOT);
        assert_eq!(*img.get_pixel(2, 3), ROBOT);
        assert_eq!(*img.get_pixel(8, 9), ROBOT);
        // Heading ray points along +col.
        assert_eq!(*img.get_pixel(15, 6), HEADING);
        assert_eq!(*img.get_pixel(16, 6), FREE);
        assert_eq!(*img.get_pixel(17, 10), GOAL);
    }

    #[test]
    fn robot_near_edge_is_clipped() {
        let grid = grid_with_unknown_column();
        let img = render_snapshot(&grid, GridPose::new(0, 0, std::f64::consts::PI), None);
        assert_eq!(*img.get_pixel(0, 0), ROBOT);
        assert_eq!(*img.get_pixel(3, 3), ROBOT);
    }

    fn snapshot_event(cycle: u64, grid: &OccupancyGrid) -> Event {
        Event::new(
            "test",
            EventPayload::Snapshot {
                cycle,
                metadata: *grid.metadata(),
                origin: grid.origin(),
                cells: grid.to_raw(),
                robot: Pose2D::new(5.5, 6.5, 0.0),
            },
        )
    }

    #[tokio::test]
    async fn sink_writes_one_png_per_snapshot() {
        let dir = tempfile::tempdir().unwrap();
        let bus = EventBus::new(64);
        let handle = DebugImageSink::spawn(&bus, dir.path().join("frames"));

        let grid = grid_with_unknown_column();
        bus.publish(snapshot_event(1, &grid));
        bus.publish(snapshot_event(2, &grid));
        bus.publish(Event::new(
            "test",
            EventPayload::Finished(LoopReport {
                termination: Termination::Complete,
                cycles: 2,
                goals_issued: 1,
                goals_succeeded: 1,
            }),
        ));

        assert_eq!(handle.await.unwrap(), 2);
        let first = dir.path().join("frames/cycle_0001.png");
        let second = dir.path().join("frames/cycle_0002.png");
        assert!(first.exists());
        assert!(second.exists());

        let decoded = image::open(&first).unwrap().to_rgb8();
        assert_eq!(decoded.dimensions(), (20, 12));
        assert_eq!(*decoded.get_pixel(0, 0), OCCUPIED);
    }
}
