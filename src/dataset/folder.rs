//! Class-per-subdirectory image folder scanning
//!
//! Each immediate subdirectory of the root is one class. Class names are
//! sorted, and a class's label is its index in that order:
//!
//! ```text
//! train/
//! ├── Apple___Apple_scab/
//! │   ├── image1.jpg
//! │   └── image2.jpg
//! ├── Apple___healthy/
//! │   └── ...
//! └── ...
//! ```

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use super::IMAGE_EXTENSIONS;
use crate::utils::error::{Result, TrainerError};

/// A single labeled image on disk
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageSample {
    pub path: PathBuf,
    pub label: usize,
}

/// Labeled images discovered under one split directory
#[derive(Debug, Clone)]
pub struct ImageFolder {
    pub root: PathBuf,
    pub class_names: Vec<String>,
    pub samples: Vec<ImageSample>,
}

impl ImageFolder {
    /// Scan `root`, inferring classes from its subdirectories
    pub fn scan<P: AsRef<Path>>(root: P) -> Result<Self> {
        let root = root.as_ref().to_path_buf();
        info!("Scanning image folder: {:?}", root);

        let class_names = list_class_dirs(&root)?;
        if class_names.is_empty() {
            return Err(TrainerError::Dataset(format!(
                "No class subdirectories found in {:?}",
                root
            )));
        }

        let samples = collect_samples(&root, &class_names, |name| {
            class_names.iter().position(|c| c == name)
        });
        Self::finish(root, class_names, samples)
    }

    /// Scan `root` using an existing class list
    ///
    /// Labels agree with the folder the class list came from. A subdirectory
    /// that is not a known class is an error.
    pub fn scan_with_classes<P: AsRef<Path>>(root: P, class_names: &[String]) -> Result<Self> {
        let root = root.as_ref().to_path_buf();
        info!("Scanning image folder: {:?} ({} known classes)", root, class_names.len());

        let found = list_class_dirs(&root)?;
        let index: HashMap<&str, usize> = class_names
            .iter()
            .enumerate()
            .map(|(idx, name)| (name.as_str(), idx))
            .collect();

        if let Some(unknown) = found.iter().find(|name| !index.contains_key(name.as_str())) {
            return Err(TrainerError::Dataset(format!(
                "Class directory '{}' in {:?} does not exist in the training set",
                unknown, root
            )));
        }

        for missing in class_names.iter().filter(|name| !found.contains(name)) {
            warn!("Class '{}' has no directory in {:?}", missing, root);
        }

        let samples = collect_samples(&root, &found, |name| index.get(name).copied());
        Self::finish(root, class_names.to_vec(), samples)
    }

    fn finish(root: PathBuf, class_names: Vec<String>, samples: Vec<ImageSample>) -> Result<Self> {
        if samples.is_empty() {
            return Err(TrainerError::Dataset(format!("No images found in {:?}", root)));
        }

        info!(
            "Found {} images belonging to {} classes",
            samples.len(),
            class_names.len()
        );

        Ok(Self {
            root,
            class_names,
            samples,
        })
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn num_classes(&self) -> usize {
        self.class_names.len()
    }

    /// `(path, label)` pairs in scan order
    pub fn labeled_paths(&self) -> Vec<(PathBuf, usize)> {
        self.samples
            .iter()
            .map(|s| (s.path.clone(), s.label))
            .collect()
    }

    pub fn stats(&self) -> FolderStats {
        let mut class_counts = vec![0usize; self.num_classes()];
        for sample in &self.samples {
            class_counts[sample.label] += 1;
        }

        FolderStats {
            total_samples: self.samples.len(),
            class_names: self.class_names.clone(),
            class_counts,
        }
    }
}

/// Per-class sample counts of one split
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FolderStats {
    pub total_samples: usize,
    pub class_names: Vec<String>,
    pub class_counts: Vec<usize>,
}

impl FolderStats {
    pub fn print(&self) {
        println!("  Total samples: {}", self.total_samples);
        println!("  Number of classes: {}", self.class_names.len());

        for (idx, (name, count)) in self.class_names.iter().zip(&self.class_counts).enumerate() {
            let share = if self.total_samples > 0 {
                *count as f64 / self.total_samples as f64
            } else {
                0.0
            };
            let bar = "█".repeat((share * 40.0) as usize);
            println!("    {:3}. {:40} {:6} {}", idx, name, count, bar);
        }
    }
}

/// Sorted names of the immediate subdirectories of `root`
fn list_class_dirs(root: &Path) -> Result<Vec<String>> {
    if !root.exists() {
        return Err(TrainerError::PathNotFound(root.to_path_buf()));
    }
    if !root.is_dir() {
        return Err(TrainerError::Dataset(format!("{:?} is not a directory", root)));
    }

    let mut class_dirs = Vec::new();
    for entry in fs::read_dir(root)? {
        let entry = entry?;
        // Follows symlinked class directories; dangling links are skipped
        let is_dir = fs::metadata(entry.path()).map(|m| m.is_dir()).unwrap_or(false);
        if is_dir {
            if let Some(name) = entry.file_name().to_str() {
                class_dirs.push(name.to_string());
            }
        }
    }
    class_dirs.sort();

    Ok(class_dirs)
}

fn collect_samples<F>(root: &Path, class_dirs: &[String], label_of: F) -> Vec<ImageSample>
where
    F: Fn(&str) -> Option<usize>,
{
    let mut samples = Vec::new();

    for class_name in class_dirs {
        let Some(label) = label_of(class_name) else {
            continue;
        };

        let mut paths: Vec<PathBuf> = WalkDir::new(root.join(class_name))
            .min_depth(1)
            .follow_links(true)
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().is_file())
            .map(|e| e.into_path())
            .filter(|p| is_image_file(p))
            .collect();
        paths.sort();

        if paths.is_empty() {
            warn!("Class '{}' has no images in {:?}", class_name, root);
        }
        debug!("Class '{}' (label {}): {} images", class_name, label, paths.len());
        samples.extend(paths.into_iter().map(|path| ImageSample { path, label }));
    }

    samples
}

/// True for files with a supported image extension (case-insensitive)
pub fn is_image_file(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| IMAGE_EXTENSIONS.contains(&ext.to_lowercase().as_str()))
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn touch(path: &Path) {
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, b"").unwrap();
    }

    fn layout(root: &Path) {
        touch(&root.join("Tomato___healthy/a.jpg"));
        touch(&root.join("Tomato___healthy/b.PNG"));
        touch(&root.join("Tomato___healthy/notes.txt"));
        touch(&root.join("Apple___Black_rot/x.jpeg"));
        touch(&root.join("Apple___Black_rot/nested/y.bmp"));
        touch(&root.join("stray.jpg"));
    }

    #[test]
    fn test_classes_sorted_and_labeled_by_index() {
        let dir = TempDir::new().unwrap();
        layout(dir.path());

        let folder = ImageFolder::scan(dir.path()).unwrap();
        assert_eq!(folder.class_names, vec!["Apple___Black_rot", "Tomato___healthy"]);
        assert_eq!(folder.len(), 4);

        let apple: Vec<_> = folder.samples.iter().filter(|s| s.label == 0).collect();
        assert_eq!(apple.len(), 2);
        assert!(apple.iter().any(|s| s.path.ends_with("nested/y.bmp")));
    }

    #[test]
    fn test_non_images_and_root_files_are_ignored() {
        let dir = TempDir::new().unwrap();
        layout(dir.path());

        let folder = ImageFolder::scan(dir.path()).unwrap();
        assert!(folder.samples.iter().all(|s| !s.path.ends_with("notes.txt")));
        assert!(folder.samples.iter().all(|s| !s.path.ends_with("stray.jpg")));
    }

    #[test]
    fn test_stats_count_per_class() {
        let dir = TempDir::new().unwrap();
        layout(dir.path());

        let stats = ImageFolder::scan(dir.path()).unwrap().stats();
        assert_eq!(stats.total_samples, 4);
        assert_eq!(stats.class_counts, vec![2, 2]);
    }

    #[test]
    fn test_missing_root_is_error() {
        let dir = TempDir::new().unwrap();
        let err = ImageFolder::scan(dir.path().join("absent")).unwrap_err();
        assert!(matches!(err, TrainerError::PathNotFound(_)));
    }

    #[test]
    fn test_empty_root_is_error() {
        let dir = TempDir::new().unwrap();
        assert!(ImageFolder::scan(dir.path()).is_err());

        fs::create_dir_all(dir.path().join("Corn___healthy")).unwrap();
        let err = ImageFolder::scan(dir.path()).unwrap_err();
        assert!(err.to_string().contains("No images"));
    }

    #[test]
    fn test_validation_labels_follow_training_classes() {
        let dir = TempDir::new().unwrap();
        touch(&dir.path().join("val/Tomato___healthy/v.jpg"));

        let classes = vec!["Apple___Black_rot".to_string(), "Tomato___healthy".to_string()];
        let val = ImageFolder::scan_with_classes(dir.path().join("val"), &classes).unwrap();

        assert_eq!(val.num_classes(), 2);
        assert_eq!(val.samples[0].label, 1);
    }

    #[test]
    fn test_unknown_validation_class_is_error() {
        let dir = TempDir::new().unwrap();
        touch(&dir.path().join("Grape___Black_rot/v.jpg"));

        let classes = vec!["Apple___Black_rot".to_string()];
        let err = ImageFolder::scan_with_classes(dir.path(), &classes).unwrap_err();
        assert!(err.to_string().contains("Grape___Black_rot"));
    }

    #[cfg(unix)]
    #[test]
    fn test_symlinked_classes_and_images_are_scanned() {
        use std::os::unix::fs::symlink;

        let dir = TempDir::new().unwrap();
        let store = dir.path().join("store");
        let train = dir.path().join("train");
        touch(&store.join("scab.jpg"));
        touch(&store.join("Corn___rust/r1.jpg"));
        touch(&store.join("Corn___rust/r2.jpg"));
        touch(&train.join("Apple___healthy/c.jpg"));
        fs::create_dir_all(train.join("Apple___scab")).unwrap();
        symlink(store.join("scab.jpg"), train.join("Apple___scab/a.jpg")).unwrap();
        symlink(store.join("Corn___rust"), train.join("Corn___rust")).unwrap();

        let folder = ImageFolder::scan(&train).unwrap();
        assert_eq!(
            folder.class_names,
            vec!["Apple___healthy", "Apple___scab", "Corn___rust"]
        );
        assert_eq!(folder.len(), 4);
        assert_eq!(folder.stats().class_counts, vec![1, 1, 2]);
    }

    #[cfg(unix)]
    #[test]
    fn test_dangling_class_link_is_ignored() {
        use std::os::unix::fs::symlink;

        let dir = TempDir::new().unwrap();
        touch(&dir.path().join("Apple___healthy/c.jpg"));
        symlink(dir.path().join("gone"), dir.path().join("Apple___scab")).unwrap();

        let folder = ImageFolder::scan(dir.path()).unwrap();
        assert_eq!(folder.class_names, vec!["Apple___healthy"]);
    }

    #[test]
    fn test_is_image_file() {
        assert!(is_image_file(Path::new("leaf.JPG")));
        assert!(is_image_file(Path::new("leaf.gif")));
        assert!(!is_image_file(Path::new("leaf.tiff")));
        assert!(!is_image_file(Path::new("README")));
    }
}
