use crate::export::{CitationEntry, EntryType};

pub fn generate_bibtex(entry: &CitationEntry) -> String {
    let mut bib = format!("@{}{{{},\n", map_entry_type(entry.entry_type), entry.cite_key);

    push_field(&mut bib, "title", &entry.title);

    if !entry.authors.is_empty() {
        push_field(&mut bib, "author", &entry.authors.join(" and "));
    }

    if let Some(year) = entry.year {
        bib.push_str(&format!("  year = {{{year}}},\n"));
    }

    if let Some(venue) = &entry.venue {
        push_field(&mut bib, "journal", venue);
    }

    // Identifiers
    if let Some(doi) = &entry.doi {
        push_field(&mut bib, "doi", doi);
    }
    if let Some(pmid) = &entry.pubmed_id {
        push_field(&mut bib, "pmid", pmid);
    }
    if let Some(arxiv) = &entry.arxiv_id {
        push_field(&mut bib, "eprint", arxiv);
        bib.push_str("  archivePrefix = {arXiv},\n");
    }

    if let Some(summary) = &entry.abstract_text {
        push_field(&mut bib, "abstract", summary);
    }

    bib.push_str("}\n");
    bib
}

/// All entries, blank-line separated.
pub fn generate_bibliography<'a>(entries: impl IntoIterator<Item = &'a CitationEntry>) -> String {
    entries
        .into_iter()
        .map(generate_bibtex)
        .collect::<Vec<_>>()
        .join("\n")
}

fn push_field(bib: &mut String, name: &str, value: &str) {
    bib.push_str(&format!("  {name} = {{{}}},\n", escape_bibtex(value)));
}

fn map_entry_type(entry_type: EntryType) -> &'static str {
    match entry_type {
        EntryType::Article => "article",
        EntryType::Preprint => "unpublished",
        EntryType::Misc => "misc",
    }
}

fn escape_bibtex(s: &str) -> String {
    s.replace('&', "\\&")
        .replace('_', "\\_")
        .replace('$', "\\$")
        .replace('%', "\\%")
        .replace('#', "\\#")
        .replace('{', "\\{")
        .replace('}', "\\}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use paperscope_core::{IdentifierKind, Record};
    use uuid::Uuid;

    #[test]
    fn test_generate_bibtex() {
        let mut record = Record::new(Uuid::nil(), "Attention Is All You Need");
        record.authors = vec!["Vaswani, Ashish".to_string(), "Shazeer, Noam".to_string()];
        record.publication_year = Some(2017);
        record.venue_name = "Advances in Neural Information Processing Systems".to_string();
        record
            .identifiers
            .insert(IdentifierKind::Doi, "10.5555/3295222.3295349")
            .unwrap();

        let bib = generate_bibtex(&CitationEntry::from_record(&record));
        assert!(bib.starts_with("@article{vaswani2017attention,\n"));
        assert!(bib.contains("title = {Attention Is All You Need}"));
        assert!(bib.contains("author = {Vaswani, Ashish and Shazeer, Noam}"));
        assert!(bib.contains("year = {2017}"));
        assert!(bib.contains("doi = {10.5555/3295222.3295349}"));
        assert!(bib.ends_with("}\n"));
    }

    #[test]
    fn test_escapes_special_characters() {
        let record = Record::new(Uuid::nil(), "Costs & benefits of 100% {recall}");
        let bib = generate_bibtex(&CitationEntry::from_record(&record));
        assert!(bib.starts_with("@misc{anoncosts,"));
        assert!(bib.contains(r"title = {Costs \& benefits of 100\% \{recall\}}"));
    }

    #[test]
    fn test_bibliography_separates_entries() {
        let a = CitationEntry::from_record(&Record::new(Uuid::from_u128(1), "One"));
        let b = CitationEntry::from_record(&Record::new(Uuid::from_u128(2), "Two"));
        let text = generate_bibliography([&a, &b]);
        assert_eq!(text.matches("@misc{").count(), 2);
        assert!(text.contains("}\n\n@misc{anontwo"));
    }
}
