use std::path::Path;
use std::process::{Command, Output};

fn verseref_cmd(fixture: &str) -> Command {
    let mut cmd = Command::new(env!("CARGO_BIN_EXE_verseref"));
    cmd.current_dir(Path::new("tests/fixtures").join(fixture));
    cmd.env_remove("RUST_LOG");
    cmd
}

fn run(fixture: &str, args: &[&str]) -> Output {
    verseref_cmd(fixture).args(args).output().unwrap()
}

fn stdout(output: &Output) -> String {
    String::from_utf8_lossy(&output.stdout).into_owned()
}

fn stderr(output: &Output) -> String {
    String::from_utf8_lossy(&output.stderr).into_owned()
}

#[test]
fn verse_accepts_abbreviations() {
    let out = run("mini", &["verse", "jn", "3:16"]);
    assert!(out.status.success(), "verse failed: {}", stderr(&out));
    assert!(stdout(&out).starts_with("John 3:16  For God so loved the world"));
}

#[test]
fn range_with_spelled_ordinal_and_alias() {
    let out = run("mini", &["verse", "First corinth 13:4-5"]);
    assert!(out.status.success(), "verse failed: {}", stderr(&out));
    let text = stdout(&out);
    let refs: Vec<&str> = text.lines().map(|l| l.split("  ").next().unwrap()).collect();
    assert_eq!(refs, vec!["1 Corinthians 13:4", "1 Corinthians 13:5"]);
}

#[test]
fn verse_json_output() {
    let out = run("mini", &["--format", "json", "verse", "I John 1:1-4 - fellowship"]);
    assert!(out.status.success(), "verse failed: {}", stderr(&out));
    let json: serde_json::Value = serde_json::from_slice(&out.stdout).unwrap();
    let verses = json["verses"].as_array().unwrap();
    assert_eq!(verses.len(), 4);
    assert_eq!(verses[0]["reference"], "1 John 1:1");
    assert_eq!(verses[0]["highlighted"], true);
    assert_eq!(verses[3]["verse"]["text"], "and these things we write, that our joy may be made full.");
}

#[test]
fn chapter_highlights_and_neighbours() {
    let out = run("mini", &["chapter", "psalm", "23", "--highlight", "1,4"]);
    assert!(out.status.success(), "chapter failed: {}", stderr(&out));
    let text = stdout(&out);
    assert!(text.starts_with("# Psalms 23 (ASV)\n"));
    assert!(text.contains(">   1  Jehovah is my shepherd"));
    assert!(text.contains("    2  He maketh me to lie down"));
    assert!(text.contains(">   4  Yea, though I walk"));
    assert!(text.contains("previous: Genesis 1  next: Matthew 5"));
}

#[test]
fn chapter_steps_across_books() {
    let out = run("mini", &["chapter", "John", "3", "--next"]);
    assert!(out.status.success(), "chapter failed: {}", stderr(&out));
    assert!(stdout(&out).starts_with("# 1 John 1 (ASV)\n"));

    let first = run("mini", &["chapter", "Genesis", "1", "--prev"]);
    assert!(first.status.success());
    assert!(stdout(&first).starts_with("# Genesis 1 (ASV)\n"));
    assert!(stderr(&first).contains("Genesis 1 is the first chapter"));
}

#[test]
fn chapter_selection_lists_related_verses() {
    let out = run("mini", &["chapter", "ps", "23", "--select", "1"]);
    assert!(out.status.success(), "chapter failed: {}", stderr(&out));
    let text = stdout(&out);
    assert!(text.contains("*   1  Jehovah is my shepherd"));
    assert!(text.contains("## Related\n\nPsalms 23:6  [2]"), "{text}");

    let outside = run("mini", &["chapter", "ps", "23", "--select", "9"]);
    assert_eq!(outside.status.code(), Some(2));
}

#[test]
fn parse_shows_rule_and_expansion() {
    let out = run("mini", &["parse", "Matt 5:3-5 - beatitudes"]);
    assert!(out.status.success(), "parse failed: {}", stderr(&out));
    assert_eq!(
        stdout(&out),
        "rule: verse-range\nMatthew 5:3  (range to 5)\nMatthew 5:4  (range to 5)\nMatthew 5:5  (range to 5)\n"
    );
}

#[test]
fn search_is_case_insensitive() {
    let out = run("mini", &["search", "BLESSED"]);
    assert!(out.status.success(), "search failed: {}", stderr(&out));
    assert_eq!(stdout(&out).lines().count(), 8);
    assert!(stderr(&out).contains("8 verses match"));
}

#[test]
fn related_ranks_shared_keywords() {
    let out = run("mini", &["related", "Psalm 23:1"]);
    assert!(out.status.success(), "related failed: {}", stderr(&out));
    let text = stdout(&out);
    assert!(text.starts_with("Psalms 23:6  [2]  Surely goodness"), "{text}");
    assert!(!text.contains("Psalms 23:1 "));
    assert!(text.lines().count() <= 3);
}

/// Relevance column of `related` text output.
fn relevances(text: &str) -> Vec<usize> {
    text.lines()
        .map(|l| {
            let start = l.find('[').unwrap() + 1;
            let end = l.find(']').unwrap();
            l[start..end].parse().unwrap()
        })
        .collect()
}

#[test]
fn related_pools_a_range_into_one_ranking() {
    let dir = tempfile::tempdir().unwrap();
    let mut records = vec![
        serde_json::json!({"book_name": "Proverbs", "chapter": 1, "verse": 1, "text": "Wisdom crieth without; Understanding putteth forth her voice."}),
        serde_json::json!({"book_name": "Proverbs", "chapter": 1, "verse": 2, "text": "Counsel standeth before princes and judges."}),
    ];
    for verse in 1..=5 {
        let text = format!("Wisdom and understanding are found in the gate, saith verse {verse}.");
        records.push(serde_json::json!({"book_name": "Job", "chapter": 1, "verse": verse, "text": text}));
    }
    for verse in 1..=5 {
        let text = format!("Wisdom and counsel for princes in the field, saith verse {verse}.");
        records.push(serde_json::json!({"book_name": "Ruth", "chapter": 1, "verse": verse, "text": text}));
    }
    std::fs::write(dir.path().join("bible.json"), serde_json::Value::Array(records).to_string()).unwrap();

    let out = Command::new(env!("CARGO_BIN_EXE_verseref"))
        .current_dir(dir.path())
        .args(["--dataset", "bible.json", "related", "Proverbs 1:1-2"])
        .output()
        .unwrap();
    assert!(out.status.success(), "related failed: {}", stderr(&out));
    let text = stdout(&out);

    assert_eq!(text.lines().count(), 5, "{text}");
    assert!(text.lines().all(|l| l.starts_with("Ruth 1:")), "{text}");
    let scores = relevances(&text);
    assert!(scores.windows(2).all(|w| w[0] >= w[1]), "{text}");
    assert_eq!(scores[0], 3);
}

#[test]
fn books_in_dataset_order() {
    let out = run("mini", &["books"]);
    assert!(out.status.success(), "books failed: {}", stderr(&out));
    let names: Vec<String> = stdout(&out)
        .lines()
        .map(|l| l.split("  ").next().unwrap().trim().to_string())
        .collect();
    assert_eq!(
        names,
        vec!["Genesis", "Psalms", "Matthew", "John", "1 John", "2 John", "Romans", "1 Corinthians"]
    );
}

#[test]
fn unknown_book_exits_2_with_suggestion() {
    let out = run("mini", &["verse", "Genisis", "1:1"]);
    assert_eq!(out.status.code(), Some(2));
    let err = stderr(&out);
    assert!(err.contains("Error: Book Not Found"), "{err}");
    assert!(err.contains("Did you mean `Genesis`?"), "{err}");
}

#[test]
fn missing_verse_in_range_exits_2() {
    let out = run("mini", &["verse", "John 3:16-18"]);
    assert_eq!(out.status.code(), Some(2));
    assert!(stderr(&out).contains("John 3:18"));
}

#[test]
fn malformed_reference_exits_3() {
    let out = run("mini", &["verse", "3:16"]);
    assert_eq!(out.status.code(), Some(3));
    assert!(stderr(&out).contains("Error: Invalid Reference"));
}

#[test]
fn check_clean_dataset() {
    let out = run("mini", &["check"]);
    assert!(out.status.success(), "check failed: {}", stderr(&out));
    assert!(stdout(&out).contains("31 verses indexed, 0 quarantined"));
}

#[test]
fn check_reports_quarantined_records() {
    let out = run("broken", &["check"]);
    assert_eq!(out.status.code(), Some(1));
    let text = stdout(&out);
    assert!(text.contains("duplicate reference `Genesis 1:5`"), "{text}");
    assert!(text.contains("5 verses indexed, 2 quarantined"), "{text}");
}

#[test]
fn missing_dataset_is_a_load_error() {
    let out = run("mini", &["--dataset", "nowhere.json", "books"]);
    assert_eq!(out.status.code(), Some(3));
    assert!(stderr(&out).contains("Error: Dataset Load Failed"));
}

#[test]
fn alias_add_list_remove() {
    let dir = tempfile::tempdir().unwrap();
    let bin = env!("CARGO_BIN_EXE_verseref");
    let in_dir = |args: &[&str]| Command::new(bin).current_dir(dir.path()).args(args).output().unwrap();

    let add = in_dir(&["alias", "add", "apoc", "revelation"]);
    assert!(add.status.success(), "alias add failed: {}", stderr(&add));
    assert!(stdout(&add).contains("apoc -> Revelation"));

    let list = in_dir(&["alias", "list"]);
    assert_eq!(stdout(&list).trim(), "apoc -> Revelation");

    let bad = in_dir(&["alias", "add", "1 jn", "John"]);
    assert_eq!(bad.status.code(), Some(3));
    assert!(stderr(&bad).contains("Error: Invalid Alias"));

    let remove = in_dir(&["alias", "remove", "apoc"]);
    assert!(remove.status.success());
    let again = in_dir(&["alias", "remove", "apoc"]);
    assert_eq!(again.status.code(), Some(2));
}

#[test]
fn info_json_reports_state() {
    let out = run("mini", &["info", "--json"]);
    assert!(out.status.success());
    let json: serde_json::Value = serde_json::from_slice(&out.stdout).unwrap();
    assert_eq!(json["current_state"]["config_found"], true);
    assert_eq!(json["current_state"]["verses"], 31);
    assert_eq!(json["current_state"]["translation"], "ASV");
}

#[test]
fn ask_without_verses_is_rejected_before_the_backend() {
    let out = verseref_cmd("mini")
        .env_remove("OPENAI_API_KEY")
        .args(["ask", "analyze"])
        .output()
        .unwrap();
    assert_eq!(out.status.code(), Some(3));
    assert!(stderr(&out).contains("Invalid verses format"));
}
