/// Chinese function words and punctuation dropped from query tokens
/// (§4.7 step 1), ported verbatim from `examples/original_source/
/// retrieval/config.py`'s `search.stopwords`.
pub const STOPWORDS: &[&str] = &[
    "的", "是", "在", "了", "和", "与", "及", "或", "等", "个", "为", "有", "以", "将", "从",
    "把", "被", "让", "向", "到", "由", "给", "对", "而", "着", "之", "其", "中", "？", "！",
    "，", "。", "、", "；", "：", "（", "）", "【", "】", "什么", "怎么", "如何", "哪些", "哪个",
];

pub fn is_stopword(token: &str) -> bool {
    STOPWORDS.contains(&token)
}
