//! Directory-Labelled Image Loader
//!
//! Scans a directory whose subdirectories are classes, splits it into
//! training/validation subsets and decodes images into CHW tensors.

use std::path::{Path, PathBuf};

use image::imageops::FilterType;
use image::{DynamicImage, ImageReader};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use walkdir::WalkDir;

use crate::utils::error::{PlantHealthError, Result};

/// File extensions recognised as images (compared case-insensitively)
pub const IMAGE_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "bmp", "ppm", "tif", "tiff"];

/// A single image sample with its label
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageSample {
    /// Path to the image file
    pub path: PathBuf,
    /// Class label index
    pub label: usize,
}

/// Which part of a directory a producer reads
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Subset {
    /// Every sample
    All,
    /// Samples left after holding out the validation fraction
    Training,
    /// The first `floor(split * n)` samples of each class
    Validation,
}

/// An image directory with one subdirectory per class
///
/// ```text
/// root/
/// ├── diseased/
/// │   ├── leaf_001.jpg
/// │   └── leaf_002.jpg
/// └── healthy/
///     └── ...
/// ```
#[derive(Debug, Clone)]
pub struct ImageFolder {
    /// Root directory of the dataset
    pub root_dir: PathBuf,
    /// Class names, sorted; the index is the label
    pub class_names: Vec<String>,
    /// All samples, grouped by class; see [`class_files`] for the order within a class
    pub samples: Vec<ImageSample>,
}

impl ImageFolder {
    /// Discover classes and samples under `root_dir`
    pub fn scan<P: AsRef<Path>>(root_dir: P) -> Result<Self> {
        let root_dir = root_dir.as_ref().to_path_buf();
        info!("Scanning image directory: {:?}", root_dir);

        if !root_dir.is_dir() {
            return Err(PlantHealthError::PathNotFound(root_dir));
        }

        let mut class_names: Vec<String> = Vec::new();
        for entry in std::fs::read_dir(&root_dir)? {
            let entry = entry?;
            if entry.file_type()?.is_dir() {
                if let Some(name) = entry.file_name().to_str() {
                    class_names.push(name.to_string());
                }
            }
        }
        class_names.sort();

        if class_names.is_empty() {
            return Err(PlantHealthError::Dataset(format!(
                "No class subdirectories found in {:?}",
                root_dir
            )));
        }

        let mut samples = Vec::new();
        for (label, class_name) in class_names.iter().enumerate() {
            let class_dir = root_dir.join(class_name);

            let paths = class_files(&class_dir);
            debug!("Class '{}' (label {}): {} images", class_name, label, paths.len());

            samples.extend(paths.into_iter().map(|path| ImageSample { path, label }));
        }

        if samples.is_empty() {
            return Err(PlantHealthError::Dataset(format!(
                "No images found in {:?}",
                root_dir
            )));
        }

        info!(
            "Found {} images belonging to {} classes",
            samples.len(),
            class_names.len()
        );

        Ok(Self {
            root_dir,
            class_names,
            samples,
        })
    }

    /// Get the number of classes
    pub fn num_classes(&self) -> usize {
        self.class_names.len()
    }

    /// Get the number of samples
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    /// Check if there are no samples
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Fail unless the directory holds exactly two classes
    pub fn require_binary(&self) -> Result<()> {
        if self.num_classes() != 2 {
            return Err(PlantHealthError::Dataset(format!(
                "binary classification needs exactly 2 class directories in {:?}, found {}: {:?}",
                self.root_dir,
                self.num_classes(),
                self.class_names
            )));
        }
        Ok(())
    }

    /// Samples of one subset
    ///
    /// For each class with `n` samples the first `floor(split * n)` samples
    /// form the validation subset and the rest the training subset.
    pub fn subset(&self, subset: Subset, validation_split: f64) -> Vec<ImageSample> {
        if subset == Subset::All {
            return self.samples.clone();
        }

        let mut selected = Vec::new();
        for label in 0..self.num_classes() {
            let class_samples: Vec<&ImageSample> =
                self.samples.iter().filter(|s| s.label == label).collect();
            let n_val = validation_count(class_samples.len(), validation_split);

            let chosen = match subset {
                Subset::Validation => &class_samples[..n_val],
                _ => &class_samples[n_val..],
            };
            selected.extend(chosen.iter().map(|s| (*s).clone()));
        }

        selected
    }

    /// Get statistics about the dataset
    pub fn get_stats(&self, validation_split: f64) -> DatasetStats {
        let mut class_counts = vec![0usize; self.num_classes()];
        for sample in &self.samples {
            class_counts[sample.label] += 1;
        }

        let validation_counts = class_counts
            .iter()
            .map(|&n| validation_count(n, validation_split))
            .collect();

        DatasetStats {
            total_samples: self.samples.len(),
            class_names: self.class_names.clone(),
            class_counts,
            validation_counts,
        }
    }
}

/// Image files anywhere below `class_dir`
///
/// Directories are visited in path order and the files of each directory
/// are listed by name, so the files directly inside `class_dir` come before
/// those of its subdirectories.
pub fn class_files(class_dir: &Path) -> Vec<PathBuf> {
    let mut files: Vec<(PathBuf, PathBuf)> = WalkDir::new(class_dir)
        .min_depth(1)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .map(|e| e.into_path())
        .filter(|p| is_image_file(p))
        .filter_map(|p| {
            let parent = p.parent()?.to_path_buf();
            Some((parent, p))
        })
        .collect();
    files.sort();

    files.into_iter().map(|(_, path)| path).collect()
}

/// Number of validation samples held out of a class with `n` samples
pub fn validation_count(n: usize, validation_split: f64) -> usize {
    ((n as f64 * validation_split).floor() as usize).min(n)
}

/// Whether the path has a recognised image extension
pub fn is_image_file(path: &Path) -> bool {
    path.extension()
        .map(|ext| ext.to_string_lossy().to_lowercase())
        .map(|ext| IMAGE_EXTENSIONS.contains(&ext.as_str()))
        .unwrap_or(false)
}

/// Decode an image and resize it to `image_size x image_size`
pub fn load_image(path: &Path, image_size: usize) -> Result<DynamicImage> {
    let img = ImageReader::open(path)
        .map_err(|e| PlantHealthError::ImageLoad(path.to_path_buf(), e.to_string()))?
        .with_guessed_format()
        .map_err(|e| PlantHealthError::ImageLoad(path.to_path_buf(), e.to_string()))?
        .decode()
        .map_err(|e| PlantHealthError::ImageLoad(path.to_path_buf(), e.to_string()))?;

    Ok(img.resize_exact(image_size as u32, image_size as u32, FilterType::Nearest))
}

/// Load an image as a CHW tensor with values rescaled to `[0, 1]`
pub fn load_image_tensor(path: &Path, image_size: usize) -> Result<Vec<f32>> {
    let img = load_image(path, image_size)?;
    Ok(image_to_tensor(&img))
}

/// Convert an image to CHW `f32` data scaled by `1/255`
pub fn image_to_tensor(img: &DynamicImage) -> Vec<f32> {
    let rgb = img.to_rgb8();
    let (width, height) = (rgb.width() as usize, rgb.height() as usize);
    let plane = height * width;
    let mut tensor = vec![0.0f32; 3 * plane];

    for (x, y, pixel) in rgb.enumerate_pixels() {
        let idx = y as usize * width + x as usize;
        tensor[idx] = pixel[0] as f32 / 255.0;
        tensor[plane + idx] = pixel[1] as f32 / 255.0;
        tensor[2 * plane + idx] = pixel[2] as f32 / 255.0;
    }

    tensor
}

/// Statistics about a dataset directory
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatasetStats {
    pub total_samples: usize,
    pub class_names: Vec<String>,
    pub class_counts: Vec<usize>,
    pub validation_counts: Vec<usize>,
}

impl DatasetStats {
    /// Print statistics to console
    pub fn print(&self) {
        println!("\n📊 Dataset Statistics:");
        println!("  Total samples: {}", self.total_samples);
        println!("  Number of classes: {}", self.class_names.len());
        println!("\n  Samples per class (train / validation):");

        for (idx, name) in self.class_names.iter().enumerate() {
            let count = self.class_counts[idx];
            let val = self.validation_counts[idx];
            let bar_len = (count as f32 / self.total_samples.max(1) as f32 * 40.0) as usize;
            let bar: String = "█".repeat(bar_len);
            println!(
                "    {:2}. {:30} {:6} ({:5} / {:5}) {}",
                idx,
                name,
                count,
                count - val,
                val,
                bar
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, RgbImage};
    use tempfile::tempdir;

    fn write_image(path: &Path, color: [u8; 3]) {
        let img = RgbImage::from_pixel(10, 6, Rgb(color));
        img.save(path).unwrap();
    }

    fn make_folder(root: &Path, classes: &[(&str, usize)]) {
        for (class, count) in classes {
            let dir = root.join(class);
            std::fs::create_dir_all(&dir).unwrap();
            for i in 0..*count {
                write_image(&dir.join(format!("img_{:03}.png", i)), [200, 40, 10]);
            }
        }
    }

    #[test]
    fn test_scan_sorted_classes() {
        let dir = tempdir().unwrap();
        make_folder(dir.path(), &[("healthy", 3), ("diseased", 2)]);
        std::fs::write(dir.path().join("healthy").join("notes.txt"), "skip me").unwrap();

        let folder = ImageFolder::scan(dir.path()).unwrap();
        assert_eq!(folder.class_names, vec!["diseased", "healthy"]);
        assert_eq!(folder.len(), 5);
        assert!(folder.samples.iter().all(|s| s.label < 2));
        assert_eq!(folder.samples[0].label, 0);
        assert!(folder.require_binary().is_ok());
    }

    #[test]
    fn test_scan_nested_files_in_directory_order() {
        let dir = tempdir().unwrap();
        for class in ["diseased", "healthy"] {
            let class_dir = dir.path().join(class);
            std::fs::create_dir_all(class_dir.join("batch2")).unwrap();
            write_image(&class_dir.join("a.png"), [10, 120, 10]);
            write_image(&class_dir.join("batch2").join("b.png"), [10, 120, 10]);
            write_image(&class_dir.join("c.png"), [10, 120, 10]);
            std::fs::write(class_dir.join("d.gif"), b"GIF89a").unwrap();
        }

        let folder = ImageFolder::scan(dir.path()).unwrap();
        let relative: Vec<String> = folder
            .samples
            .iter()
            .map(|s| {
                s.path
                    .strip_prefix(dir.path())
                    .unwrap()
                    .to_string_lossy()
                    .replace('\\', "/")
            })
            .collect();

        assert_eq!(
            relative,
            vec![
                "diseased/a.png",
                "diseased/c.png",
                "diseased/batch2/b.png",
                "healthy/a.png",
                "healthy/c.png",
                "healthy/batch2/b.png",
            ]
        );
        assert_eq!(folder.get_stats(0.2).class_counts, vec![3, 3]);
    }

    #[test]
    fn test_is_image_file() {
        assert!(is_image_file(Path::new("leaf.JPG")));
        assert!(is_image_file(Path::new("scan.tiff")));
        assert!(!is_image_file(Path::new("leaf.gif")));
        assert!(!is_image_file(Path::new("leaf.webp")));
        assert!(!is_image_file(Path::new("README")));
    }

    #[test]
    fn test_scan_errors() {
        assert!(matches!(
            ImageFolder::scan("/nonexistent/plants"),
            Err(PlantHealthError::PathNotFound(_))
        ));

        let empty = tempdir().unwrap();
        assert!(ImageFolder::scan(empty.path()).is_err());

        let no_images = tempdir().unwrap();
        std::fs::create_dir_all(no_images.path().join("healthy")).unwrap();
        assert!(ImageFolder::scan(no_images.path()).is_err());
    }

    #[test]
    fn test_require_binary() {
        let dir = tempdir().unwrap();
        make_folder(dir.path(), &[("a", 1), ("b", 1), ("c", 1)]);

        let folder = ImageFolder::scan(dir.path()).unwrap();
        assert!(folder.require_binary().is_err());
    }

    #[test]
    fn test_subset_split() {
        let dir = tempdir().unwrap();
        make_folder(dir.path(), &[("diseased", 7), ("healthy", 10)]);
        let folder = ImageFolder::scan(dir.path()).unwrap();

        let train = folder.subset(Subset::Training, 0.2);
        let val = folder.subset(Subset::Validation, 0.2);

        // floor(0.2 * 7) + floor(0.2 * 10) = 1 + 2
        assert_eq!(val.len(), 3);
        assert_eq!(train.len() + val.len(), folder.len());
        assert!(val.iter().all(|v| !train.contains(v)));

        // Validation takes the first files of each class
        assert!(val[0].path.ends_with("diseased/img_000.png"));
        assert!(val[1].path.ends_with("healthy/img_000.png"));
        assert!(val[2].path.ends_with("healthy/img_001.png"));
    }

    #[test]
    fn test_zero_split() {
        let dir = tempdir().unwrap();
        make_folder(dir.path(), &[("diseased", 4), ("healthy", 4)]);
        let folder = ImageFolder::scan(dir.path()).unwrap();

        assert!(folder.subset(Subset::Validation, 0.0).is_empty());
        assert_eq!(folder.subset(Subset::Training, 0.0).len(), 8);
        assert_eq!(folder.subset(Subset::All, 0.5).len(), 8);
    }

    #[test]
    fn test_load_image_tensor() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("leaf.png");
        write_image(&path, [255, 0, 51]);

        let tensor = load_image_tensor(&path, 4).unwrap();
        assert_eq!(tensor.len(), 3 * 4 * 4);
        assert!(tensor[..16].iter().all(|&v| (v - 1.0).abs() < 1e-6));
        assert!(tensor[16..32].iter().all(|&v| v == 0.0));
        assert!(tensor[32..].iter().all(|&v| (v - 0.2).abs() < 1e-6));
    }

    #[test]
    fn test_load_invalid_image() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("broken.jpg");
        std::fs::write(&path, b"not an image").unwrap();

        assert!(matches!(
            load_image_tensor(&path, 8),
            Err(PlantHealthError::ImageLoad(_, _))
        ));
    }

    #[test]
    fn test_stats() {
        let dir = tempdir().unwrap();
        make_folder(dir.path(), &[("diseased", 5), ("healthy", 10)]);
        let folder = ImageFolder::scan(dir.path()).unwrap();

        let stats = folder.get_stats(0.2);
        assert_eq!(stats.total_samples, 15);
        assert_eq!(stats.class_counts, vec![5, 10]);
        assert_eq!(stats.validation_counts, vec![1, 2]);
    }
}
