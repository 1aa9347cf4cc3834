//! Deterministic derivation of feature SQL from a summary and its tags.

const MAX_FEATURES: usize = 10;
const MAX_DESCRIPTION_CHARS: usize = 400;
const FALLBACK_NAME: &str = "caratteristica";
const FALLBACK_DESCRIPTION: &str = "descrizione non disponibile";

/// Builds a `CREATE TABLE IF NOT EXISTS` statement plus one `INSERT` per
/// feature for the `caratteristiche` table.
///
/// The first `MAX_FEATURES` tags become feature names; the summary is split
/// into sentence fragments on terminal punctuation and paired positionally,
/// as is the i-th covered page (SQL `NULL` when pages run out). String
/// values are quoted via JSON string encoding, which escapes quotes in a
/// form these statements accept.
pub fn generate_feature_sql(summary: &str, tags: &[String], pages: &[u32]) -> String {
    let names: Vec<&str> = if tags.is_empty() {
        vec![FALLBACK_NAME]
    } else {
        tags.iter().map(String::as_str).take(MAX_FEATURES).collect()
    };
    let sentences = split_sentences(summary);

    let mut sql = String::from(
        "CREATE TABLE IF NOT EXISTS caratteristiche (\n\
         \x20   id INTEGER PRIMARY KEY AUTOINCREMENT,\n\
         \x20   nome TEXT NOT NULL,\n\
         \x20   descrizione TEXT,\n\
         \x20   pagina INTEGER\n\
         );\n",
    );
    for (i, name) in names.iter().enumerate() {
        let description = sentences
            .get(i)
            .map(|s| truncate_chars(s, MAX_DESCRIPTION_CHARS))
            .unwrap_or_else(|| FALLBACK_DESCRIPTION.to_string());
        let page = pages
            .get(i)
            .map(|p| p.to_string())
            .unwrap_or_else(|| "NULL".to_string());
        sql.push_str(&format!(
            "INSERT INTO caratteristiche (nome, descrizione, pagina) VALUES ({}, {}, {});\n",
            quote(name),
            quote(&description),
            page
        ));
    }
    sql
}

fn split_sentences(summary: &str) -> Vec<String> {
    summary
        .split(['.', '!', '?'])
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

fn truncate_chars(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => text[..idx].to_string(),
        None => text.to_string(),
    }
}

fn quote(value: &str) -> String {
    serde_json::to_string(value).unwrap_or_else(|_| "\"\"".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tags(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn pairs_tags_sentences_and_pages_positionally() {
        let sql = generate_feature_sql("A. B. C.", &tags(&["t1", "t2"]), &[1, 2]);
        let inserts: Vec<&str> = sql.lines().filter(|l| l.starts_with("INSERT")).collect();
        assert_eq!(inserts.len(), 2);
        assert_eq!(
            inserts[0],
            "INSERT INTO caratteristiche (nome, descrizione, pagina) VALUES (\"t1\", \"A\", 1);"
        );
        assert_eq!(
            inserts[1],
            "INSERT INTO caratteristiche (nome, descrizione, pagina) VALUES (\"t2\", \"B\", 2);"
        );
        assert!(sql.starts_with("CREATE TABLE IF NOT EXISTS caratteristiche"));
    }

    #[test]
    fn missing_pages_become_null() {
        let sql = generate_feature_sql("Uno. Due.", &tags(&["a", "b"]), &[7]);
        assert!(sql.contains("VALUES (\"b\", \"Due\", NULL);"));
    }

    #[test]
    fn no_tags_falls_back_to_single_placeholder() {
        let sql = generate_feature_sql("Solo una frase.", &[], &[3]);
        let inserts: Vec<&str> = sql.lines().filter(|l| l.starts_with("INSERT")).collect();
        assert_eq!(inserts.len(), 1);
        assert!(inserts[0].contains("\"caratteristica\""));
        assert!(inserts[0].contains("\"Solo una frase\""));
    }

    #[test]
    fn missing_sentences_use_placeholder_description() {
        let sql = generate_feature_sql("", &tags(&["x"]), &[]);
        assert!(sql.contains("\"descrizione non disponibile\""));
    }

    #[test]
    fn tags_are_capped_at_ten() {
        let many: Vec<String> = (0..15).map(|i| format!("t{i}")).collect();
        let sql = generate_feature_sql("Frase.", &many, &[]);
        let inserts = sql.lines().filter(|l| l.starts_with("INSERT")).count();
        assert_eq!(inserts, 10);
    }

    #[test]
    fn descriptions_are_truncated_and_quotes_escaped() {
        let long = format!("{}.", "x".repeat(500));
        let sql = generate_feature_sql(&long, &tags(&["t"]), &[]);
        assert!(sql.contains(&format!("\"{}\"", "x".repeat(400))));

        let sql = generate_feature_sql("Disse \"salve\" al re.", &tags(&["t"]), &[1]);
        assert!(sql.contains("\\\"salve\\\""));
    }
}
