use log::{info, warn};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};

use crate::config::{PipelineConfig, SplitRatios};
use crate::error::{PrepError, Result};
use crate::utils::{recreate_split_dir, step_progress_bar};

// Keeps products like 0.7 * 10 from landing just below a whole number
const ROUNDING_SLACK: f64 = 1e-9;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Split {
    Train,
    Test,
    Val,
}

impl Split {
    pub const ALL: [Split; 3] = [Split::Train, Split::Test, Split::Val];

    pub fn dir_name(&self) -> &'static str {
        match self {
            Split::Train => "train",
            Split::Test => "test",
            Split::Val => "val",
        }
    }
}

/// An emitted image and the label file it was grouped by
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct SampleFiles {
    pub image: PathBuf,
    pub label: PathBuf,
}

// Struct to hold one class's samples partitioned into train/test/val
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SplitData<T> {
    pub train: Vec<T>,
    pub test: Vec<T>,
    pub val: Vec<T>,
}

impl<T> SplitData<T> {
    pub fn get(&self, split: Split) -> &[T] {
        match split {
            Split::Train => &self.train,
            Split::Test => &self.test,
            Split::Val => &self.val,
        }
    }
}

/// Split `items` into train/test/val. The remainder left after taking
/// `floor(train * n)` training items is divided test-first by the relative
/// test share, rounding the test count up.
pub fn split_samples<T: Clone>(items: &[T], ratios: &SplitRatios, seed: u64) -> SplitData<T> {
    let mut shuffled = items.to_vec();
    let mut rng = StdRng::seed_from_u64(seed);
    shuffled.shuffle(&mut rng);

    let n = shuffled.len();
    let train_size = ((n as f64 * ratios.train + ROUNDING_SLACK).floor() as usize).min(n);
    let rest = n - train_size;
    let test_size =
        ((rest as f64 * ratios.relative_test() - ROUNDING_SLACK).ceil().max(0.0) as usize).min(rest);

    let val = shuffled.split_off(train_size + test_size);
    let test = shuffled.split_off(train_size);
    SplitData {
        train: shuffled,
        test,
        val,
    }
}

/// Samples grouped by the class token of their label file
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClassGroups {
    groups: BTreeMap<String, Vec<SampleFiles>>,
    skipped_empty: usize,
}

impl ClassGroups {
    /// Scan `data_dir` (not recursively) for label files and group them by class
    pub fn scan(data_dir: &Path) -> Result<Self> {
        let pattern = format!("{}/*.txt", glob::Pattern::escape(&data_dir.to_string_lossy()));
        let mut label_paths: Vec<PathBuf> = glob::glob(&pattern)?
            .filter_map(|entry| entry.ok())
            .filter(|path| path.is_file())
            .collect();
        label_paths.sort();

        let mut groups: BTreeMap<String, Vec<SampleFiles>> = BTreeMap::new();
        let mut skipped_empty = 0;
        for label in label_paths {
            let Some(class) = read_class_token(&label)? else {
                warn!("Skipping empty label file: {}", label.display());
                skipped_empty += 1;
                continue;
            };
            let image = label.with_extension("png");
            groups
                .entry(class)
                .or_default()
                .push(SampleFiles { image, label });
        }

        Ok(Self {
            groups,
            skipped_empty,
        })
    }

    pub fn classes(&self) -> impl Iterator<Item = &str> {
        self.groups.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &[SampleFiles])> {
        self.groups
            .iter()
            .map(|(class, files)| (class.as_str(), files.as_slice()))
    }

    pub fn get(&self, class: &str) -> Option<&[SampleFiles]> {
        self.groups.get(class).map(Vec::as_slice)
    }

    pub fn len(&self) -> usize {
        self.groups.len()
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    pub fn skipped_empty(&self) -> usize {
        self.skipped_empty
    }
}

/// First whitespace-separated token of the first line
fn read_class_token(path: &Path) -> Result<Option<String>> {
    let file = File::open(path).map_err(|e| PrepError::io_at(path, e))?;
    let mut first_line = String::new();
    BufReader::new(file)
        .read_line(&mut first_line)
        .map_err(|e| PrepError::io_at(path, e))?;
    Ok(first_line.split_whitespace().next().map(str::to_string))
}

// Struct to hold how many files landed in each split
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct SplitStats {
    pub classes: usize,
    pub train: usize,
    pub test: usize,
    pub val: usize,
    pub skipped_empty: usize,
}

impl SplitStats {
    fn record(&mut self, split: Split, count: usize) {
        match split {
            Split::Train => self.train += count,
            Split::Test => self.test += count,
            Split::Val => self.val += count,
        }
    }

    pub fn print_summary(&self) {
        info!("=== Split Summary ===");
        info!("Classes: {}", self.classes);
        info!("Train: {}", self.train);
        info!("Test: {}", self.test);
        info!("Val: {}", self.val);
        if self.skipped_empty > 0 {
            warn!("Skipped (empty label file): {}", self.skipped_empty);
        }
    }
}

/// Partitions extracted samples per class and copies them into
/// `<data_dir>/<split>/<class>/`
pub struct DatasetSplitter {
    data_dir: PathBuf,
    ratios: SplitRatios,
    seed: u64,
    copy_labels: bool,
}

impl DatasetSplitter {
    pub fn new(config: &PipelineConfig) -> Self {
        Self {
            data_dir: config.output_dir.clone(),
            ratios: config.split_ratios,
            seed: config.seed,
            copy_labels: config.copy_labels,
        }
    }

    pub fn run(&self) -> Result<SplitStats> {
        // Fail before touching the filesystem
        self.ratios.validate()?;

        let groups = ClassGroups::scan(&self.data_dir)?;
        if groups.is_empty() {
            warn!("No label files found in {}", self.data_dir.display());
        }
        info!(
            "Found {} classes in {}",
            groups.len(),
            self.data_dir.display()
        );

        let splits: Vec<(&str, SplitData<SampleFiles>)> = groups
            .iter()
            .map(|(class, files)| (class, split_samples(files, &self.ratios, self.seed)))
            .collect();

        self.setup_split_directories(&groups)?;

        let total: usize = splits
            .iter()
            .map(|(_, data)| data.train.len() + data.test.len() + data.val.len())
            .sum();
        let pb = step_progress_bar(total as u64, "Split", "samples");

        let mut stats = SplitStats {
            classes: groups.len(),
            skipped_empty: groups.skipped_empty(),
            ..SplitStats::default()
        };
        for (class, data) in &splits {
            for split in Split::ALL {
                let files = data.get(split);
                if files.is_empty() {
                    warn!("Class {} has no samples in {}", class, split.dir_name());
                }
                let target = self.class_dir(split, class);
                for sample in files {
                    copy_into(&sample.image, &target)?;
                    if self.copy_labels {
                        copy_into(&sample.label, &target)?;
                    }
                    pb.inc(1);
                }
                stats.record(split, files.len());
            }
        }
        pb.finish_with_message("Split complete");

        stats.print_summary();
        Ok(stats)
    }

    fn class_dir(&self, split: Split, class: &str) -> PathBuf {
        self.data_dir
            .join(split.dir_name())
            .join(sanitize_filename::sanitize(class))
    }

    /// Recreate every split directory and one subdirectory per class inside it
    fn setup_split_directories(&self, groups: &ClassGroups) -> Result<()> {
        for split in Split::ALL {
            let split_dir = self.data_dir.join(split.dir_name());
            recreate_split_dir(&split_dir)?;
            for class in groups.classes() {
                let class_dir = self.class_dir(split, class);
                fs::create_dir_all(&class_dir).map_err(|e| PrepError::io_at(&class_dir, e))?;
            }
        }
        Ok(())
    }
}

fn copy_into(file: &Path, dir: &Path) -> Result<()> {
    let file_name = file
        .file_name()
        .ok_or_else(|| PrepError::io_at(file, std::io::ErrorKind::InvalidInput.into()))?;
    fs::copy(file, dir.join(file_name)).map_err(|e| PrepError::io_at(file, e))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_split_samples() {
        let items: Vec<usize> = (0..10).collect();
        let split = split_samples(&items, &SplitRatios::default(), 42);

        assert_eq!(split.train.len(), 7);
        assert_eq!(split.test.len(), 2);
        assert_eq!(split.val.len(), 1);
    }

    #[test]
    fn split_is_a_disjoint_cover() {
        for n in 0..60 {
            let items: Vec<usize> = (0..n).collect();
            let split = split_samples(&items, &SplitRatios::default(), 42);

            let all: Vec<usize> = split
                .train
                .iter()
                .chain(&split.test)
                .chain(&split.val)
                .copied()
                .collect();
            assert_eq!(all.len(), n);
            let unique: HashSet<usize> = all.into_iter().collect();
            assert_eq!(unique, items.iter().copied().collect::<HashSet<usize>>());

            let n = n as f64;
            assert!((split.train.len() as f64 - 0.70 * n).abs() <= 1.0);
            assert!((split.test.len() as f64 - 0.15 * n).abs() <= 1.0);
            assert!((split.val.len() as f64 - 0.15 * n).abs() <= 1.0);
        }
    }

    #[test]
    fn split_is_reproducible_for_a_seed() {
        let items: Vec<usize> = (0..25).collect();
        let ratios = SplitRatios::default();
        assert_eq!(
            split_samples(&items, &ratios, 42),
            split_samples(&items, &ratios, 42)
        );
    }

    #[test]
    fn tiny_classes_still_split() {
        let split = split_samples(&["only"], &SplitRatios::default(), 42);
        assert!(split.train.is_empty());
        assert_eq!(split.test, vec!["only"]);
        assert!(split.val.is_empty());
    }

    #[test]
    fn scan_groups_by_first_token() {
        let temp_dir = tempfile::tempdir().unwrap();
        let dir = temp_dir.path();
        fs::write(dir.join("image_0.txt"), "0 0.5 0.5 1.0 1.0\n").unwrap();
        fs::write(dir.join("image_1.txt"), "-1 0.5 0.5 1.0 1.0\n").unwrap();
        fs::write(dir.join("image_2.txt"), "0 0.5 0.5 1.0 1.0\n").unwrap();
        fs::write(dir.join("image_3.txt"), "").unwrap();
        fs::write(dir.join("notes.md"), "0").unwrap();

        let groups = ClassGroups::scan(dir).unwrap();

        assert_eq!(groups.classes().collect::<Vec<_>>(), vec!["-1", "0"]);
        assert_eq!(groups.skipped_empty(), 1);
        let zeros = groups.get("0").unwrap();
        assert_eq!(zeros.len(), 2);
        assert_eq!(zeros[0].image, dir.join("image_0.png"));
        assert_eq!(zeros[1].label, dir.join("image_2.txt"));
    }

    #[test]
    fn bad_ratios_leave_filesystem_untouched() {
        let temp_dir = tempfile::tempdir().unwrap();
        let config = PipelineConfig {
            output_dir: temp_dir.path().to_path_buf(),
            split_ratios: SplitRatios {
                train: 0.8,
                test: 0.1,
                val: 0.2,
            },
            ..PipelineConfig::default()
        };

        let result = DatasetSplitter::new(&config).run();

        assert!(matches!(result, Err(PrepError::InvalidSplitRatios { .. })));
        assert_eq!(fs::read_dir(temp_dir.path()).unwrap().count(), 0);
    }
}
