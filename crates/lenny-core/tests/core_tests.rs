use std::fs;
use tempfile::TempDir;

use lenny_core::data_processor::{ChunkingConfig, DataProcessor, TRANSCRIPTS_DIR, WRITING_DIR};
use lenny_core::Partition;

#[test]
fn process_directory_single_small_post() {
    let tmp = TempDir::new().unwrap();
    let dir = tmp.path().join(WRITING_DIR);
    fs::create_dir_all(&dir).unwrap();
    fs::write(dir.join("a.txt"), "Short text").unwrap();

    let processor = DataProcessor::new();
    let segments = processor.process_directory(tmp.path()).expect("process");

    assert_eq!(segments.len(), 1, "one small paragraph becomes one segment");
    assert_eq!(segments[0].text, "Short text");
    assert_eq!(segments[0].partition(), Partition::Subject);
    assert_eq!(segments[0].source_id, "writing/a");
}

#[test]
fn writing_is_always_subject_even_with_questions() {
    let processor = DataProcessor::new();
    let segments = processor.process_writing("writing/p", "Is PMF a feeling?\n\nNo. It's a retention curve.", None);
    assert_eq!(segments.len(), 2);
    assert!(segments.iter().all(|s| s.partition() == Partition::Subject));
    assert!(segments.iter().all(|s| s.source_doc_length == 2));
}

#[test]
fn long_paragraphs_are_split_with_overlap() {
    let processor = DataProcessor::with_chunking(ChunkingConfig { max_words: 10, overlap_percent: 0.2 });
    let words: Vec<String> = (0..25).map(|i| format!("w{}", i)).collect();
    let segments = processor.process_writing("writing/long", &words.join(" "), None);
    assert_eq!(segments.len(), 3);
    assert!(segments[1].text.starts_with("w8 "), "second chunk overlaps by two words: {}", segments[1].text);
    for (i, s) in segments.iter().enumerate() { assert_eq!(s.position_index, i); assert_eq!(s.id, format!("writing/long:{}", i)); }
}

#[test]
fn transcript_turns_are_labeled_once_with_positions() {
    let tmp = TempDir::new().unwrap();
    let dir = tmp.path().join(TRANSCRIPTS_DIR);
    fs::create_dir_all(&dir).unwrap();
    let guest_answer = "We spent two years iterating on onboarding and the thing that finally moved retention was cutting the number of steps in half and adding a single clear activation moment that every new team reached within their first session";
    let mut body = String::from("url: https://youtu.be/abc\n");
    body.push_str("Welcome to the podcast everyone. ");
    for _ in 0..30 { body.push_str(guest_answer); body.push_str(". "); }
    body.push_str("What did you learn?");
    fs::write(dir.join("ep1.txt"), body).unwrap();

    let segments = DataProcessor::new().process_directory(tmp.path()).expect("process");
    assert_eq!(segments.len(), 32);
    assert_eq!(segments[0].partition(), Partition::Subject, "intro turn");
    assert_eq!(segments[10].partition(), Partition::Other, "long guest answer");
    assert_eq!(segments[31].partition(), Partition::Subject, "short closing question");
    assert!(segments.iter().all(|s| s.source_url.as_deref() == Some("https://youtu.be/abc")));
    assert!(segments.iter().all(|s| s.source_doc_length == 32));
}

#[test]
fn empty_corpus_yields_no_segments() {
    let tmp = TempDir::new().unwrap();
    let segments = DataProcessor::new().process_directory(tmp.path()).expect("process");
    assert!(segments.is_empty());
}

#[test]
fn settings_default_when_file_missing() {
    let tmp = TempDir::new().unwrap();
    let settings = lenny_core::config::Config::from_file(&tmp.path().join("absent.toml")).settings().unwrap();
    assert_eq!(settings.retrieval.top_k_per_partition, 3);
    assert_eq!(settings.embedding.provider, "hash");
    assert_eq!(settings.generation.model, "meta/llama-3.1-70b-instruct");
    assert_eq!(settings.generation.max_tokens, 500);
    assert!(settings.persona.frameworks.is_none());
}

#[test]
fn settings_read_frameworks_and_reject_bad_values() {
    let tmp = TempDir::new().unwrap();
    let good = tmp.path().join("good.toml");
    fs::write(
        &good,
        "[retrieval]\ntop_k_per_partition = 5\n\n[[persona.frameworks]]\nname = \"pricing\"\nkeywords = [\"pricing\"]\ncontent = \"Charge more.\"\n",
    )
    .unwrap();
    let config = lenny_core::config::Config::from_file(&good);
    let settings = config.settings().unwrap();
    assert_eq!(settings.retrieval.top_k_per_partition, 5);
    assert_eq!(settings.persona.frameworks.as_ref().map(Vec::len), Some(1));
    assert_eq!(config.get::<usize>("retrieval.top_k_per_partition").unwrap(), 5);

    let bad = tmp.path().join("bad.toml");
    fs::write(&bad, "[generation]\ntemperature = 3.5\n").unwrap();
    assert!(lenny_core::config::Config::from_file(&bad).settings().is_err());
}

#[test]
fn nested_files_with_same_stem_stay_distinct() {
    let tmp = TempDir::new().unwrap();
    for (year, text) in [("2023", "Old post about PMF"), ("2024", "New post about retention")] {
        let dir = tmp.path().join(WRITING_DIR).join(year);
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join("pmf.txt"), text).unwrap();
    }

    let segments = DataProcessor::new().process_directory(tmp.path()).unwrap();
    let ids: Vec<(&str, &str)> = segments.iter().map(|s| (s.id.as_str(), s.source_id.as_str())).collect();
    assert_eq!(ids, vec![("writing/2023/pmf:0", "writing/2023/pmf"), ("writing/2024/pmf:0", "writing/2024/pmf")]);
}

#[test]
fn request_errors_do_not_assume_a_missing_question() {
    use lenny_core::Error;
    let notice = Error::InvalidRequest("top_k_per_partition must be at least 1".into()).user_notice();
    assert!(!notice.contains("need a question"));
    assert_ne!(notice, Error::RetrievalUnavailable(anyhow::anyhow!("down")).user_notice());
    assert!(Error::InvalidRequest("x".into()).stage().is_none());
}
