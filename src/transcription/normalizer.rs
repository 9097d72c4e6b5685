//! # Transcript Normalizer
//!
//! Deterministic cleanup applied to every raw engine transcript before it is
//! stored. Two passes run in order:
//!
//! 1. **dedup**: collapse runs of filler words, collapse runs of three or more
//!    identical characters, collapse whitespace, trim.
//! 2. **punctuate**: mark sentence-ending particles with `？` / `！`, terminate
//!    long unpunctuated spans with `。`, collapse stacked terminal marks.
//!
//! ## Key Rust Concepts:
//! - Works on `Vec<char>` so every length and position is counted in
//!   characters, not UTF-8 bytes.
//! - Pure functions over `&str`; the normalizer holds only its word lists.
//!
//! Running the normalizer on its own output returns the same text. The length
//! rule may segment differently when normalized text is edited by hand and fed
//! back in.

use crate::config::NormalizerConfig;

const TERMINAL_PUNCTUATION: [char; 6] = ['。', '！', '？', '!', '?', '.'];
const CLAUSE_PUNCTUATION: [char; 7] = ['，', ',', '；', ';', '：', ':', '、'];

fn is_terminal(c: char) -> bool {
    TERMINAL_PUNCTUATION.contains(&c)
}

fn is_clause(c: char) -> bool {
    CLAUSE_PUNCTUATION.contains(&c)
}

#[derive(Debug, Clone)]
pub struct TextNormalizer {
    /// Longest first so that `就是说` wins over `就是`.
    fillers: Vec<Vec<char>>,
    interrogatives: Vec<Vec<char>>,
    exclamatories: Vec<Vec<char>>,
    sentence_length: usize,
}

impl TextNormalizer {
    pub fn new(config: &NormalizerConfig) -> Self {
        let to_chars = |words: &[String]| -> Vec<Vec<char>> {
            words
                .iter()
                .filter(|w| !w.is_empty())
                .map(|w| w.chars().collect())
                .collect()
        };

        let mut fillers = to_chars(&config.filler_words);
        fillers.sort_by(|a, b| b.len().cmp(&a.len()));

        Self {
            fillers,
            interrogatives: to_chars(&config.interrogative_particles),
            exclamatories: to_chars(&config.exclamatory_particles),
            sentence_length: config.sentence_length.max(1),
        }
    }

    /// Full pipeline: `punctuate(dedup(text))`.
    pub fn normalize(&self, text: &str) -> String {
        self.punctuate(&self.dedup(text))
    }

    pub fn dedup(&self, text: &str) -> String {
        let chars: Vec<char> = text.chars().collect();
        let chars = self.collapse_fillers(&chars);
        let chars = collapse_char_runs(&chars);
        let collapsed: String = chars.into_iter().collect();
        collapsed.split_whitespace().collect::<Vec<_>>().join(" ")
    }

    pub fn punctuate(&self, text: &str) -> String {
        let chars: Vec<char> = text.chars().collect();
        let chars = self.mark_particles(&chars);
        let chars = self.terminate_long_spans(&chars);
        collapse_terminal_runs(&chars).into_iter().collect()
    }

    fn filler_at(&self, chars: &[char], pos: usize) -> Option<&[char]> {
        self.fillers
            .iter()
            .find(|filler| chars[pos..].starts_with(filler))
            .map(|filler| filler.as_slice())
    }

    /// A run of adjacent fillers, mixed or not, becomes its last filler.
    fn collapse_fillers(&self, chars: &[char]) -> Vec<char> {
        let mut out = Vec::with_capacity(chars.len());
        let mut pos = 0;
        while pos < chars.len() {
            let Some(mut last) = self.filler_at(chars, pos) else {
                out.push(chars[pos]);
                pos += 1;
                continue;
            };
            pos += last.len();
            while pos < chars.len() {
                let Some(next) = self.filler_at(chars, pos) else {
                    break;
                };
                last = next;
                pos += next.len();
            }
            out.extend_from_slice(last);
        }
        out
    }

    fn particle_mark(&self, preceding: &[char]) -> Option<char> {
        if self.interrogatives.iter().any(|p| preceding.ends_with(p)) {
            Some('？')
        } else if self.exclamatories.iter().any(|p| preceding.ends_with(p)) {
            Some('！')
        } else {
            None
        }
    }

    /// A particle ends a sentence when followed by end of text, whitespace or
    /// clause punctuation. A following clause mark is replaced by the terminal
    /// mark; a following terminal mark means the sentence is already closed.
    fn mark_particles(&self, chars: &[char]) -> Vec<char> {
        let mut out = Vec::with_capacity(chars.len() + 8);
        let mut pos = 0;
        while pos < chars.len() {
            out.push(chars[pos]);
            pos += 1;

            let Some(mark) = self.particle_mark(&out) else {
                continue;
            };
            match chars.get(pos) {
                None => out.push(mark),
                Some(next) if next.is_whitespace() => out.push(mark),
                Some(next) if is_clause(*next) => {
                    out.push(mark);
                    pos += 1;
                }
                Some(_) => {}
            }
        }
        out
    }

    fn terminate_long_spans(&self, chars: &[char]) -> Vec<char> {
        let mut out = Vec::with_capacity(chars.len() + 8);
        let mut span = 0;
        for &c in chars {
            if is_terminal(c) {
                if span >= self.sentence_length {
                    out.push('。');
                }
                span = 0;
            } else {
                span += 1;
            }
            out.push(c);
        }
        if span >= self.sentence_length {
            out.push('。');
        }
        out
    }
}

fn collapse_char_runs(chars: &[char]) -> Vec<char> {
    let mut out = Vec::with_capacity(chars.len());
    let mut pos = 0;
    while pos < chars.len() {
        let c = chars[pos];
        let run = chars[pos..].iter().take_while(|&&next| next == c).count();
        if run >= 3 {
            out.push(c);
        } else {
            out.extend(std::iter::repeat(c).take(run));
        }
        pos += run;
    }
    out
}

/// Keeps the last mark of every run of adjacent terminal punctuation.
fn collapse_terminal_runs(chars: &[char]) -> Vec<char> {
    let mut out: Vec<char> = Vec::with_capacity(chars.len());
    for &c in chars {
        if is_terminal(c) && out.last().is_some_and(|prev| is_terminal(*prev)) {
            out.pop();
        }
        out.push(c);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn normalizer() -> TextNormalizer {
        TextNormalizer::new(&NormalizerConfig::default())
    }

    #[test]
    fn test_repeated_filler_collapses() {
        let n = normalizer();
        assert_eq!(n.dedup("啊啊啊啊你好"), "啊你好");
        assert_eq!(n.dedup("这个这个问题"), "这个问题");
        assert_eq!(n.dedup("就是说就是说可以"), "就是说可以");
    }

    #[test]
    fn test_mixed_filler_run_keeps_last() {
        let n = normalizer();
        assert_eq!(n.dedup("嗯啊嗯啊你好"), "啊你好");
        assert_eq!(n.dedup("嗯啊 你好"), "啊 你好");
        assert_eq!(n.dedup("好嗯啊嗯"), "好嗯");
    }

    #[test]
    fn test_character_runs_collapse() {
        let n = normalizer();
        assert_eq!(n.dedup("aaaa"), "a");
        assert_eq!(n.dedup("好好好的"), "好的");
        assert_eq!(n.dedup("天天向上"), "天天向上");
    }

    #[test]
    fn test_whitespace_collapses_and_trims() {
        let n = normalizer();
        assert_eq!(n.dedup("  hello \t\n  world  "), "hello world");
        assert_eq!(n.dedup(""), "");
    }

    #[test]
    fn test_particle_adds_question_mark_once() {
        let n = normalizer();
        assert_eq!(n.normalize("你好吗"), "你好吗？");
        assert_eq!(n.normalize("你好吗？"), "你好吗？");
        assert_eq!(n.normalize("你好吗？？"), "你好吗？");
    }

    #[test]
    fn test_particles_inside_sentence() {
        let n = normalizer();
        assert_eq!(
            n.normalize("今天天气很好啊 我们去公园吧"),
            "今天天气很好啊！ 我们去公园吧？"
        );
        assert_eq!(n.normalize("你去吗，我不去"), "你去吗？我不去");
        assert_eq!(n.normalize("吗啡"), "吗啡");
    }

    #[test]
    fn test_long_span_gets_single_period() {
        let n = normalizer();
        let text = "一二三四五六七八九十一二三四五六七八九十一二三四五";
        assert_eq!(text.chars().count(), 25);

        let normalized = n.normalize(text);
        assert_eq!(normalized, format!("{text}。"));
        assert_eq!(normalized.matches('。').count(), 1);

        let short = "一二三四五";
        assert_eq!(n.normalize(short), short);
    }

    #[test]
    fn test_terminated_long_span_is_left_alone() {
        let n = normalizer();
        let text = "一二三四五六七八九十一二三四五六七八九十一二三四五！";
        assert_eq!(n.normalize(text), text);
    }

    #[test]
    fn test_terminal_runs_keep_last_mark() {
        let n = normalizer();
        assert_eq!(n.punctuate("真的吗。？"), "真的吗？");
        assert_eq!(n.punctuate("走！。"), "走。");
    }

    #[test]
    fn test_normalize_is_idempotent() {
        let n = normalizer();
        let samples = [
            "啊啊啊啊你好",
            "嗯嗯 这个这个 项目 进展得 怎么样了吗",
            "今天天气很好啊 我们去公园吧",
            "一二三四五六七八九十一二三四五六七八九十一二三四五 好的",
            "aaaa bbb cc",
        ];
        for sample in samples {
            let once = n.normalize(sample);
            assert_eq!(n.normalize(&once), once, "sample: {sample}");
        }
    }
}
