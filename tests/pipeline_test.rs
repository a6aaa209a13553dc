use anagram_search::{AnagramError, AnagramPipeline, MergeStrategy, PipelineConfig, signature};
use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

fn config_in(dir: &Path, max_lines: usize, strategy: MergeStrategy) -> PipelineConfig {
    PipelineConfig::default()
        .with_temp_root(dir.join("tempfiles"))
        .with_output_dir(dir.join("output"))
        .with_max_lines_per_partition(max_lines)
        .with_worker_pool_size(3)
        .with_merge_strategy(strategy)
}

fn write_source(dir: &Path, lines: &[String]) -> PathBuf {
    let path = dir.join("words.txt");
    let mut text = lines.join("\n");
    text.push('\n');
    fs::write(&path, text).unwrap();
    path
}

/// Deterministic word list with plenty of anagram collisions
fn generated_words(count: usize) -> Vec<String> {
    let alphabet = ['a', 'e', 'i', 'n', 'r', 's', 't'];
    let mut state: u64 = 0x2545_f491_4f6c_dd1d;
    (0..count)
        .map(|_| {
            state = state.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
            let len = 2 + (state >> 60) as usize % 3;
            (0..len)
                .map(|k| alphabet[((state >> (8 * k + 8)) % alphabet.len() as u64) as usize])
                .collect()
        })
        .collect()
}

/// Multi-word groups computed in memory, words sorted, lines sorted
fn expected_groups(lines: &[String]) -> BTreeSet<Vec<String>> {
    let mut classes: BTreeMap<signature::Signature, BTreeSet<String>> = BTreeMap::new();
    for word in lines.iter().flat_map(|line| signature::words(line)) {
        classes.entry(signature::of_word(word)).or_default().insert(word.to_string());
    }
    classes
        .into_values()
        .filter(|words| words.len() > 1)
        .map(|words| words.into_iter().collect())
        .collect()
}

fn output_groups(path: &Path) -> Vec<Vec<String>> {
    fs::read_to_string(path)
        .unwrap()
        .lines()
        .map(|line| signature::words(line).map(str::to_string).collect())
        .collect()
}

fn tempfiles_empty(dir: &Path) -> bool {
    fs::read_dir(dir.join("tempfiles")).map(|mut entries| entries.next().is_none()).unwrap_or(true)
}

#[test]
fn test_concrete_scenario() {
    let temp_dir = tempfile::tempdir().unwrap();
    let lines: Vec<String> = ["listen", "silent", "banana", "enlist", "god"].iter().map(|s| s.to_string()).collect();
    let source = write_source(temp_dir.path(), &lines);

    let pipeline = AnagramPipeline::new(config_in(temp_dir.path(), 2, MergeStrategy::Indexed)).unwrap();
    let output = pipeline.process(&source).unwrap();

    assert_eq!(fs::read_to_string(&output).unwrap(), "enlist listen silent\n");
    assert!(output.starts_with(temp_dir.path().join("output")));
    assert!(tempfiles_empty(temp_dir.path()));
}

#[test]
fn test_partition_threshold_does_not_change_output() {
    let temp_dir = tempfile::tempdir().unwrap();
    let lines = generated_words(300);
    let source = write_source(temp_dir.path(), &lines);
    let expected = expected_groups(&lines);

    for max_lines in [1, 7, 150, 299, 300, 301, 10_000] {
        let pipeline = AnagramPipeline::new(config_in(temp_dir.path(), max_lines, MergeStrategy::Indexed)).unwrap();
        let report = pipeline.process_with_report(&source).unwrap();

        assert_eq!(report.partitions, 300_usize.div_ceil(max_lines), "max_lines {}", max_lines);
        let actual: BTreeSet<Vec<String>> = output_groups(&report.output_path).into_iter().collect();
        assert_eq!(actual, expected, "max_lines {}", max_lines);
    }
}

#[test]
fn test_output_properties_hold_for_both_strategies() {
    let temp_dir = tempfile::tempdir().unwrap();
    let lines = generated_words(500);
    let source = write_source(temp_dir.path(), &lines);
    let expected = expected_groups(&lines);

    let mut outputs = Vec::new();
    for strategy in [MergeStrategy::NestedScan, MergeStrategy::Indexed] {
        let pipeline = AnagramPipeline::new(config_in(temp_dir.path(), 37, strategy)).unwrap();
        let output = pipeline.process(&source).unwrap();
        let groups = output_groups(&output);

        let mut seen_words = HashSet::new();
        let mut seen_signatures = HashSet::new();
        for group in &groups {
            assert!(group.len() > 1, "singleton emitted: {:?}", group);
            let mut sorted = group.clone();
            sorted.sort();
            assert_eq!(&sorted, group, "words not sorted");

            let sig = signature::of_word(&group[0]);
            assert!(group.iter().all(|w| signature::of_word(w) == sig), "mixed group {:?}", group);
            assert!(seen_signatures.insert(sig), "signature split across lines");
            for word in group {
                assert!(seen_words.insert(word.clone()), "{} emitted twice", word);
            }
        }

        assert_eq!(groups.iter().cloned().collect::<BTreeSet<_>>(), expected, "{:?}", strategy);
        outputs.push(fs::read_to_string(&output).unwrap());
    }

    let as_set = |text: &str| text.lines().map(str::to_string).collect::<BTreeSet<_>>();
    assert_eq!(as_set(&outputs[0]), as_set(&outputs[1]));
}

#[test]
fn test_multi_word_lines_and_duplicates() {
    let temp_dir = tempfile::tempdir().unwrap();
    let lines: Vec<String> = ["pots tops", "", "stop", "tops", "  opts  ", "dog"]
        .iter()
        .map(|s| s.to_string())
        .collect();
    let source = write_source(temp_dir.path(), &lines);

    let pipeline = AnagramPipeline::new(config_in(temp_dir.path(), 2, MergeStrategy::NestedScan)).unwrap();
    let output = pipeline.process(&source).unwrap();

    assert_eq!(fs::read_to_string(output).unwrap(), "opts pots stop tops\n");
}

#[test]
fn test_no_anagrams_gives_empty_output() {
    let temp_dir = tempfile::tempdir().unwrap();
    let lines: Vec<String> = ["alpha", "beta", "gamma"].iter().map(|s| s.to_string()).collect();
    let source = write_source(temp_dir.path(), &lines);

    let pipeline = AnagramPipeline::new(config_in(temp_dir.path(), 1, MergeStrategy::Indexed)).unwrap();
    let report = pipeline.process_with_report(&source).unwrap();

    assert_eq!(fs::read_to_string(&report.output_path).unwrap(), "");
    assert_eq!(report.singletons_dropped, 3);
}

#[test]
fn test_empty_source() {
    let temp_dir = tempfile::tempdir().unwrap();
    let source = temp_dir.path().join("empty.txt");
    fs::write(&source, "").unwrap();

    let pipeline = AnagramPipeline::new(config_in(temp_dir.path(), 4, MergeStrategy::Indexed)).unwrap();
    let report = pipeline.process_with_report(&source).unwrap();

    assert_eq!(report.partitions, 1);
    assert_eq!(report.merge_levels, 0);
    assert_eq!(fs::read_to_string(&report.output_path).unwrap(), "");
    assert!(tempfiles_empty(temp_dir.path()));
}

#[test]
fn test_missing_source_is_unreadable() {
    let temp_dir = tempfile::tempdir().unwrap();
    let pipeline = AnagramPipeline::new(config_in(temp_dir.path(), 4, MergeStrategy::Indexed)).unwrap();

    let err = pipeline.process(&temp_dir.path().join("nope.txt")).unwrap_err();

    assert!(matches!(err, AnagramError::SourceUnreadable { .. }));
    assert_eq!(err.exit_code(), 2);
    assert!(!temp_dir.path().join("output").exists());
}

#[test]
fn test_repeated_runs_produce_distinct_outputs() {
    let temp_dir = tempfile::tempdir().unwrap();
    let lines: Vec<String> = ["evil", "live", "vile"].iter().map(|s| s.to_string()).collect();
    let source = write_source(temp_dir.path(), &lines);
    let pipeline = AnagramPipeline::new(config_in(temp_dir.path(), 1, MergeStrategy::Indexed)).unwrap();

    let first = pipeline.process(&source).unwrap();
    let second = pipeline.process(&source).unwrap();

    assert_ne!(first, second);
    assert_eq!(fs::read_to_string(&first).unwrap(), fs::read_to_string(&second).unwrap());
}

#[test]
fn test_concurrent_runs_with_same_stem_keep_their_own_output() {
    let temp_dir = tempfile::tempdir().unwrap();
    let dir_a = temp_dir.path().join("a");
    let dir_b = temp_dir.path().join("b");
    fs::create_dir_all(&dir_a).unwrap();
    fs::create_dir_all(&dir_b).unwrap();
    let source_a = write_source(&dir_a, &["listen".to_string(), "silent".to_string()]);
    let source_b = write_source(&dir_b, &["dog".to_string(), "god".to_string()]);

    let (out_a, out_b) = std::thread::scope(|scope| {
        let run = |source: PathBuf| {
            let root = temp_dir.path();
            scope.spawn(move || {
                let pipeline = AnagramPipeline::new(config_in(root, 1, MergeStrategy::Indexed)).unwrap();
                pipeline.process(&source).unwrap()
            })
        };
        let a = run(source_a);
        let b = run(source_b);
        (a.join().unwrap(), b.join().unwrap())
    });

    assert_ne!(out_a, out_b);
    assert_eq!(fs::read_to_string(&out_a).unwrap(), "listen silent\n");
    assert_eq!(fs::read_to_string(&out_b).unwrap(), "dog god\n");
    assert_eq!(fs::read_dir(temp_dir.path().join("output")).unwrap().count(), 2);
}

#[test]
fn test_timeout_fails_and_cleans_up() {
    let temp_dir = tempfile::tempdir().unwrap();
    let lines = generated_words(20_000);
    let source = write_source(temp_dir.path(), &lines);
    let config = config_in(temp_dir.path(), 100, MergeStrategy::NestedScan).with_timeout(Some(Duration::from_nanos(1)));

    let err = AnagramPipeline::new(config).unwrap().process(&source).unwrap_err();

    assert!(matches!(err, AnagramError::Timeout { .. }), "{}", err);
    assert_eq!(err.exit_code(), 124);
    assert!(!temp_dir.path().join("output").exists());
    assert!(tempfiles_empty(temp_dir.path()));
}
