use std::fs;
use std::path::{Path, PathBuf};

use image::{GrayImage, Luma};
use serde::{Deserialize, Serialize};

use crate::data::{DigitItem, HEIGHT, WIDTH};
use crate::error::Result;

/// Digits per row and column of a grid.
pub const GRID_SIZE: usize = 3;
/// Upscaling factor applied to every digit.
pub const SCALE: usize = 4;
/// Gap between cells, in output pixels.
const GAP: usize = 2;
const BACKGROUND: u8 = 128;

/// Captions written next to an image, one per cell, row-major.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Captions {
    pub title: Option<String>,
    pub cells: Vec<String>,
}

fn cell_size() -> (usize, usize) {
    (WIDTH * SCALE, HEIGHT * SCALE)
}

fn canvas(columns: usize, rows: usize) -> GrayImage {
    let (cell_width, cell_height) = cell_size();
    let width = columns * cell_width + (columns + 1) * GAP;
    let height = rows * cell_height + (rows + 1) * GAP;

    GrayImage::from_pixel(width as u32, height as u32, Luma([BACKGROUND]))
}

fn draw_digit(canvas: &mut GrayImage, image: &[[f32; WIDTH]; HEIGHT], column: usize, row: usize) {
    let (cell_width, cell_height) = cell_size();
    let origin_x = GAP + column * (cell_width + GAP);
    let origin_y = GAP + row * (cell_height + GAP);

    for (y, pixels) in image.iter().enumerate() {
        for (x, value) in pixels.iter().enumerate() {
            let intensity = (value.clamp(0.0, 1.0) * 255.0).round() as u8;
            for dy in 0..SCALE {
                for dx in 0..SCALE {
                    let px = origin_x + x * SCALE + dx;
                    let py = origin_y + y * SCALE + dy;
                    canvas.put_pixel(px as u32, py as u32, Luma([intensity]));
                }
            }
        }
    }
}

fn captions_path(path: &Path) -> PathBuf {
    path.with_extension("json")
}

fn write(path: &Path, image: GrayImage, captions: &Captions) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }

    image.save(path)?;
    fs::write(captions_path(path), serde_json::to_string_pretty(captions)?)?;
    Ok(())
}

/// Save up to nine digits as a 3x3 grid, with captions in a JSON file next to it.
pub fn save_digit_grid(path: &Path, items: &[&DigitItem], captions: Vec<String>) -> Result<()> {
    let items = &items[..items.len().min(GRID_SIZE * GRID_SIZE)];
    let mut image = canvas(GRID_SIZE, GRID_SIZE);

    for (index, item) in items.iter().enumerate() {
        draw_digit(&mut image, &item.image, index % GRID_SIZE, index / GRID_SIZE);
    }

    let cells = captions.into_iter().take(items.len()).collect();
    log::info!("Saving digit grid to {}", path.display());
    write(path, image, &Captions { title: None, cells })
}

/// Caption for a digit of known class.
pub fn class_caption(label: u8) -> String {
    format!("Class {label}")
}

/// Caption for a classified digit.
pub fn prediction_caption(predicted: u8, label: u8) -> String {
    format!("Predicted {predicted}, Class {label}")
}

/// Save one row of noisy | pure | denoised for the same digit, titled with its class.
pub fn save_denoising_comparison(
    path: &Path,
    noisy: &DigitItem,
    clean: &DigitItem,
    denoised: &DigitItem,
    label: u8,
) -> Result<()> {
    let mut image = canvas(3, 1);
    for (column, item) in [noisy, clean, denoised].into_iter().enumerate() {
        draw_digit(&mut image, &item.image, column, 0);
    }

    let captions = Captions {
        title: Some(format!("MNIST target = {label}")),
        cells: vec![
            "Noisy image".to_string(),
            "Pure image".to_string(),
            "Denoised image".to_string(),
        ],
    };
    write(path, image, &captions)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::tests::{synthetic_digit, synthetic_digits};

    #[test]
    fn grid_holds_nine_cells_and_captions() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("grids").join("samples.png");
        let items = synthetic_digits(12);
        let refs: Vec<&DigitItem> = items.iter().collect();
        let captions = items.iter().map(|item| class_caption(item.label)).collect();

        save_digit_grid(&path, &refs, captions).unwrap();

        let image = image::open(&path).unwrap().into_luma8();
        let side = (GRID_SIZE * WIDTH * SCALE + (GRID_SIZE + 1) * GAP) as u32;
        assert_eq!(image.dimensions(), (side, side));

        let captions: Captions =
            serde_json::from_str(&fs::read_to_string(path.with_extension("json")).unwrap())
                .unwrap();
        assert_eq!(captions.cells.len(), 9);
        assert_eq!(captions.cells[3], "Class 3");
    }

    #[test]
    fn digit_pixels_are_scaled_to_bytes() {
        let mut item = synthetic_digit(0);
        item.image[0][0] = 1.0;
        item.image[0][1] = 0.0;
        let mut image = canvas(1, 1);

        draw_digit(&mut image, &item.image, 0, 0);

        assert_eq!(image.get_pixel(GAP as u32, GAP as u32)[0], 255);
        assert_eq!(image.get_pixel((GAP + SCALE) as u32, GAP as u32)[0], 0);
    }

    #[test]
    fn comparison_has_three_columns_and_target_title() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("denoised-0.png");
        let noisy = synthetic_digit(1);
        let clean = synthetic_digit(2);
        let denoised = synthetic_digit(3);

        save_denoising_comparison(&path, &noisy, &clean, &denoised, 5).unwrap();

        let image = image::open(&path).unwrap().into_luma8();
        assert_eq!(image.width(), (3 * WIDTH * SCALE + 4 * GAP) as u32);
        let captions: Captions =
            serde_json::from_str(&fs::read_to_string(path.with_extension("json")).unwrap())
                .unwrap();
        assert_eq!(captions.title.as_deref(), Some("MNIST target = 5"));
    }

    #[test]
    fn prediction_caption_names_both_classes() {
        assert_eq!(prediction_caption(3, 5), "Predicted 3, Class 5");
    }
}
