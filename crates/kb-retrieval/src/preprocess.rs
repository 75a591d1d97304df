use jieba_rs::Jieba;

use crate::stopwords::is_stopword;

/// CJK-aware query tokenization (§4.7 step 1): search-mode segmentation,
/// drop single-character tokens and stopwords, dedupe, sort longest
/// first so multi-character terms are preferred during matching.
pub fn tokenize_query(jieba: &Jieba, query: &str) -> Vec<String> {
    let cleaned = clean_whitespace(query);
    let mut tokens: Vec<String> = jieba
        .cut_for_search(&cleaned, false)
        .into_iter()
        .map(|t| t.trim().to_string())
        .filter(|t| t.chars().count() > 1 && !is_stopword(t))
        .collect();

    tokens.sort();
    tokens.dedup();
    tokens.sort_by_key(|t| std::cmp::Reverse(t.chars().count()));
    tokens
}

pub fn clean_whitespace(query: &str) -> String {
    query.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn given_query_with_extra_whitespace_when_cleaned_then_collapsed_to_single_spaces() {
        assert_eq!(clean_whitespace("  hello   world  "), "hello world");
    }

    #[test]
    fn given_short_and_stopword_tokens_when_tokenizing_then_they_are_dropped() {
        let jieba = Jieba::new();
        let tokens = tokenize_query(&jieba, "的 a 数据库 是");
        assert!(!tokens.iter().any(|t| t == "的" || t == "是" || t == "a"));
    }

    #[test]
    fn given_duplicate_tokens_when_tokenizing_then_deduped_and_sorted_by_length_desc() {
        let tokens = vec!["ab".to_string(), "abcd".to_string(), "ab".to_string()];
        let mut deduped = tokens.clone();
        deduped.sort();
        deduped.dedup();
        deduped.sort_by_key(|t| std::cmp::Reverse(t.chars().count()));
        assert_eq!(deduped, vec!["abcd".to_string(), "ab".to_string()]);
    }
}
