//! Annotated snapshot persistence.
//!
//! Files are written under the save folder as `{source_id}_latest.{ext}` (always
//! overwritten) and, when enabled, `{source_id}_{YYYY-MM-DD_HH.MM.SS}.{ext}`.

use crate::config::{SaveFileFormat, SaveSettings};
use crate::error::RecognitionError;
use ab_glyph::{FontVec, PxScale};
use chrono::{DateTime, Local};
use common::faces::{FaceMatch, SaveReport};
use image::{DynamicImage, Rgb, RgbImage};
use imageproc::drawing::{draw_hollow_rect_mut, draw_text_mut, text_size};
use imageproc::rect::Rect;
use std::path::{Path, PathBuf};
use telemetry::metrics::FACE_IMAGES_SAVED;
use tracing::{debug, error, info, warn};

/// Timestamp layout of timestamped file names
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d_%H.%M.%S";

const BOX_COLOR: Rgb<u8> = Rgb([255, 255, 0]);
const BOX_LINE_WIDTH: u32 = 4;
const LABEL_SCALE: f32 = 20.0;

const FALLBACK_FONTS: &[&str] = &[
    "/usr/share/fonts/truetype/dejavu/DejaVuSans.ttf",
    "/usr/share/fonts/TTF/DejaVuSans.ttf",
    "/usr/share/fonts/dejavu/DejaVuSans.ttf",
    "/usr/share/fonts/dejavu-sans-fonts/DejaVuSans.ttf",
    "/System/Library/Fonts/Supplemental/Arial.ttf",
    "C:\\Windows\\Fonts\\arial.ttf",
];

pub struct Annotator {
    folder: PathBuf,
    format: SaveFileFormat,
    save_timestamped_file: bool,
    always_save_latest_file: bool,
    show_boxes: bool,
    font: Option<FontVec>,
}

impl Annotator {
    pub fn new(settings: &SaveSettings) -> Self {
        let font = if settings.show_boxes {
            load_font(settings.label_font_path.as_deref())
        } else {
            None
        };

        if settings.show_boxes && font.is_none() {
            warn!("No label font could be loaded, face boxes will be drawn without labels");
        }

        Self {
            folder: settings.folder.clone(),
            format: settings.format,
            save_timestamped_file: settings.save_timestamped_file,
            always_save_latest_file: settings.always_save_latest_file,
            show_boxes: settings.show_boxes,
            font,
        }
    }

    /// Save when something matched, or on every cycle if always-save is set
    pub fn should_save(&self, match_count: usize) -> bool {
        match_count > 0 || self.always_save_latest_file
    }

    pub fn latest_path(&self, source_id: &str) -> PathBuf {
        self.folder
            .join(format!("{}_latest.{}", source_id, self.format.extension()))
    }

    pub fn timestamped_path(&self, source_id: &str, at: &DateTime<Local>) -> PathBuf {
        self.folder.join(format!(
            "{}_{}.{}",
            source_id,
            at.format(TIMESTAMP_FORMAT),
            self.format.extension()
        ))
    }

    /// Copy of the frame with a labelled box around every matched face that has
    /// a bounding box
    pub fn render(&self, image: &DynamicImage, matches: &[FaceMatch]) -> RgbImage {
        let mut canvas = image.to_rgb8();
        if !self.show_boxes {
            return canvas;
        }

        let (width, height) = canvas.dimensions();
        for face in matches {
            let Some(rect) = face.bounding_box.and_then(|b| b.to_pixels(width, height)) else {
                continue;
            };

            for inset in 0..BOX_LINE_WIDTH {
                let (w, h) = (
                    rect.width.saturating_sub(2 * inset),
                    rect.height.saturating_sub(2 * inset),
                );
                if w == 0 || h == 0 {
                    break;
                }
                draw_hollow_rect_mut(
                    &mut canvas,
                    Rect::at((rect.x + inset) as i32, (rect.y + inset) as i32).of_size(w, h),
                    BOX_COLOR,
                );
            }

            if let Some(font) = &self.font {
                let label = face.label();
                let (_, text_height) = text_size(PxScale::from(LABEL_SCALE), font, &label);
                let y = rect.y as i32 - text_height as i32 - BOX_LINE_WIDTH as i32;
                let y = if y < 0 { (rect.y + BOX_LINE_WIDTH) as i32 } else { y };
                draw_text_mut(
                    &mut canvas,
                    BOX_COLOR,
                    rect.x as i32,
                    y,
                    PxScale::from(LABEL_SCALE),
                    font,
                    &label,
                );
            }
        }

        canvas
    }

    /// Render and write the cycle's files. Failures are collected in the report,
    /// never returned; the two writes are attempted independently.
    pub fn save(
        &self,
        source_id: &str,
        image: &DynamicImage,
        matches: &[FaceMatch],
        at: &DateTime<Local>,
    ) -> SaveReport {
        let mut report = SaveReport::default();

        if let Err(source) = std::fs::create_dir_all(&self.folder) {
            let err = RecognitionError::CreateFolder {
                path: self.folder.clone(),
                source,
            };
            error!(source_id = %source_id, error = %err, "Skipping image save");
            FACE_IMAGES_SAVED.with_label_values(&["folder", "failure"]).inc();
            report.errors.push(err.to_string());
            return report;
        }

        let canvas = self.render(image, matches);

        let latest = self.latest_path(source_id);
        match self.write(&canvas, &latest, "latest") {
            Ok(()) => report.latest = Some(latest),
            Err(e) => report.errors.push(e.to_string()),
        }

        if self.save_timestamped_file && !matches.is_empty() {
            let timestamped = self.timestamped_path(source_id, at);
            match self.write(&canvas, &timestamped, "timestamped") {
                Ok(()) => report.timestamped = Some(timestamped),
                Err(e) => report.errors.push(e.to_string()),
            }
        }

        report
    }

    fn write(&self, canvas: &RgbImage, path: &Path, kind: &str) -> Result<(), RecognitionError> {
        match canvas.save_with_format(path, self.format.image_format()) {
            Ok(()) => {
                info!(path = %path.display(), "Saved {} image", kind);
                FACE_IMAGES_SAVED.with_label_values(&[kind, "success"]).inc();
                Ok(())
            }
            Err(source) => {
                let err = RecognitionError::WriteImage {
                    path: path.to_path_buf(),
                    source,
                };
                error!(error = %err, "Failed to save {} image", kind);
                FACE_IMAGES_SAVED.with_label_values(&[kind, "failure"]).inc();
                Err(err)
            }
        }
    }
}

fn load_font(configured: Option<&Path>) -> Option<FontVec> {
    let candidates = configured
        .into_iter()
        .map(Path::to_path_buf)
        .chain(FALLBACK_FONTS.iter().map(PathBuf::from));

    for path in candidates {
        let Ok(bytes) = std::fs::read(&path) else {
            continue;
        };
        match FontVec::try_from_vec(bytes) {
            Ok(font) => {
                debug!(path = %path.display(), "Loaded label font");
                return Some(font);
            }
            Err(e) => warn!(path = %path.display(), error = %e, "Invalid font file"),
        }
    }

    None
}
