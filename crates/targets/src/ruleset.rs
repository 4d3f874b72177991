//! 포함/제외 규칙 집합 매칭
//!
//! [`RuleSet`]은 문자열 또는 `key:value` 쌍에 대해 평가됩니다.
//!
//! # 평가 순서
//! 1. `exclude`가 비어 있지 않고 일치하면 `false` (`include`와 무관)
//! 2. `include`가 비어 있지 않으면 일치할 때만 `true`
//! 3. 둘 다 비어 있으면 `true`
//!
//! 규칙 값에는 `*`(임의 문자열)와 `?`(한 글자) 와일드카드를 쓸 수 있습니다.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// 포함/제외(+선택자) 규칙 집합
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuleSet {
    pub include: Vec<String>,
    pub exclude: Vec<String>,
    /// 레이블 선택자 (네임스페이스 필터에서만 사용)
    pub selector: BTreeMap<String, String>,
}

impl RuleSet {
    pub fn new(include: Vec<String>, exclude: Vec<String>) -> Self {
        Self {
            include,
            exclude,
            selector: BTreeMap::new(),
        }
    }

    /// 포함 + 제외 규칙 수
    pub fn count(&self) -> usize {
        self.include.len() + self.exclude.len()
    }

    /// 규칙이 하나라도 있는지 여부
    pub fn enabled(&self) -> bool {
        self.count() > 0
    }

    /// 와일드카드 패턴으로 값을 평가합니다 (대소문자 구분).
    pub fn matches(&self, value: &str) -> bool {
        self.evaluate(|pattern| glob_match(pattern, value))
    }

    /// 대소문자를 구분하지 않고 평가합니다 (소스 이름용).
    pub fn matches_ignore_case(&self, value: &str) -> bool {
        self.evaluate(|pattern| wildcard(pattern, value, true))
    }

    /// 정확히 같은 값이 있는지로 평가합니다 (상태, 심각도용).
    pub fn contains(&self, value: &str) -> bool {
        self.evaluate(|rule| rule == value)
    }

    /// 레이블 맵을 `key:value` 규칙으로 평가합니다.
    ///
    /// `:`가 없는 규칙은 `key:*`로 취급합니다. 키는 정확히, 값은 와일드카드로
    /// 비교하며 규칙 하나라도 레이블 하나와 일치하면 그 규칙 목록은 일치입니다.
    pub fn matches_labels(&self, labels: &BTreeMap<String, String>) -> bool {
        self.evaluate(|rule| {
            let (key, pattern) = split_label_rule(rule);
            labels
                .get(key)
                .is_some_and(|value| glob_match(pattern, value))
        })
    }

    fn evaluate(&self, rule_matches: impl Fn(&str) -> bool) -> bool {
        if !self.exclude.is_empty() && self.exclude.iter().any(|r| rule_matches(r)) {
            return false;
        }
        if !self.include.is_empty() {
            return self.include.iter().any(|r| rule_matches(r));
        }
        true
    }
}

/// `key:value` 규칙을 나눕니다. 값이 없으면 `*`입니다.
fn split_label_rule(rule: &str) -> (&str, &str) {
    match rule.split_once(':') {
        Some((key, value)) => (key.trim(), value.trim()),
        None => (rule.trim(), "*"),
    }
}

/// 대소문자를 구분하는 glob 매칭 (`*`, `?`)
pub(crate) fn glob_match(pattern: &str, text: &str) -> bool {
    wildcard(pattern, text, false)
}

/// `*`로 나눈 고정 길이 조각을 순서대로 찾습니다.
///
/// 첫 조각은 앞에, 마지막 조각은 끝에 붙어야 하고, 가운데 조각은 가장 왼쪽
/// 위치를 고릅니다. `?`는 한 글자만 차지하므로 조각 길이가 고정됩니다.
fn wildcard(pattern: &str, text: &str, fold: bool) -> bool {
    if pattern == "*" {
        return true;
    }

    let chars = |s: &str| -> Vec<char> {
        if fold {
            s.chars().flat_map(char::to_lowercase).collect()
        } else {
            s.chars().collect()
        }
    };
    let text = chars(text);
    let segments: Vec<Vec<char>> = pattern.split('*').map(chars).collect();

    let Some((first, tail)) = segments.split_first() else {
        return text.is_empty();
    };
    let Some((last, middle)) = tail.split_last() else {
        return fits(first, &text);
    };
    if text.len() < first.len() + last.len()
        || !fits(first, &text[..first.len()])
        || !fits(last, &text[text.len() - last.len()..])
    {
        return false;
    }

    let mut rest = &text[first.len()..text.len() - last.len()];
    for segment in middle.iter().filter(|segment| !segment.is_empty()) {
        let Some(at) = rest
            .windows(segment.len())
            .position(|window| fits(segment, window))
        else {
            return false;
        };
        rest = &rest[at + segment.len()..];
    }
    true
}

fn fits(segment: &[char], window: &[char]) -> bool {
    segment.len() == window.len()
        && segment
            .iter()
            .zip(window)
            .all(|(p, c)| *p == '?' || p == c)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rules(include: &[&str], exclude: &[&str]) -> RuleSet {
        RuleSet::new(
            include.iter().map(|s| (*s).to_owned()).collect(),
            exclude.iter().map(|s| (*s).to_owned()).collect(),
        )
    }

    fn labels(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| ((*k).to_owned(), (*v).to_owned()))
            .collect()
    }

    #[test]
    fn empty_ruleset_allows_everything() {
        let r = RuleSet::default();
        assert!(r.matches("anything"));
        assert!(r.matches(""));
        assert!(r.contains("fail"));
        assert!(r.matches_labels(&labels(&[("app", "nginx")])));
        assert!(!r.enabled());
    }

    #[test]
    fn count_and_enabled() {
        assert_eq!(rules(&["kyverno", "falco"], &[]).count(), 2);
        assert!(rules(&[], &["kyverno"]).enabled());
    }

    #[test]
    fn include_wildcard_match() {
        let r = rules(&["team-*"], &[]);
        assert!(r.matches("team-a"));
        assert!(!r.matches("default"));
    }

    #[test]
    fn exclude_match_rejects() {
        let r = rules(&[], &["kube-*"]);
        assert!(!r.matches("kube-system"));
        assert!(r.matches("default"));
    }

    #[test]
    fn exclude_wins_over_include() {
        // Given: 같은 값이 include와 exclude 양쪽에 걸림
        let r = rules(&["team-*"], &["team-b"]);

        // When/Then: exclude가 우선
        assert!(!r.matches("team-b"));
        assert!(r.matches("team-a"));
    }

    #[test]
    fn matching_is_case_sensitive_by_default() {
        let r = rules(&["Kyverno"], &[]);
        assert!(!r.matches("kyverno"));
        assert!(r.matches_ignore_case("kyverno"));
        assert!(r.matches_ignore_case("KYVERNO"));
    }

    #[test]
    fn contains_requires_exact_value() {
        let r = rules(&["fail", "error"], &[]);
        assert!(r.contains("fail"));
        assert!(!r.contains("fai*"));
        assert!(!r.contains("pass"));

        let r = rules(&[], &["pass"]);
        assert!(!r.contains("pass"));
        assert!(r.contains("fail"));
    }

    #[test]
    fn bare_label_rule_equals_key_wildcard() {
        let input = labels(&[("app", "nginx")]);
        for (bare, explicit) in [(rules(&["app"], &[]), rules(&["app:*"], &[])), (
            rules(&[], &["app"]),
            rules(&[], &["app:*"]),
        )] {
            assert_eq!(bare.matches_labels(&input), explicit.matches_labels(&input));
        }
        assert!(rules(&["app"], &[]).matches_labels(&input));
        assert!(!rules(&[], &["app"]).matches_labels(&input));
    }

    #[test]
    fn label_rule_trims_and_matches_value_wildcard() {
        let input = labels(&[("app", "nginx"), ("tier", "frontend")]);
        assert!(rules(&[" app : ngi* "], &[]).matches_labels(&input));
        assert!(!rules(&["app:redis"], &[]).matches_labels(&input));
        assert!(!rules(&["missing"], &[]).matches_labels(&input));
    }

    #[test]
    fn label_key_is_case_sensitive() {
        let input = labels(&[("App", "nginx")]);
        assert!(!rules(&["app"], &[]).matches_labels(&input));
    }

    #[test]
    fn label_exclude_wins_over_include() {
        let input = labels(&[("app", "nginx"), ("env", "prod")]);
        let r = rules(&["app"], &["env:prod"]);
        assert!(!r.matches_labels(&input));
    }

    #[test]
    fn glob_match_wildcard_all() {
        assert!(glob_match("*", "anything"));
        assert!(glob_match("*", ""));
    }

    #[test]
    fn glob_match_exact() {
        assert!(glob_match("hello", "hello"));
        assert!(!glob_match("hello", "world"));
    }

    #[test]
    fn glob_match_question_mark() {
        assert!(glob_match("web-?", "web-1"));
        assert!(!glob_match("web-?", "web-12"));
    }

    #[test]
    fn glob_match_multiple_wildcards() {
        assert!(glob_match("a*b*c", "aXYZbXYZc"));
        assert!(!glob_match("a*b*c", "ab"));
    }

    #[test]
    fn glob_match_anchors_first_and_last_segments() {
        assert!(glob_match("kube-*", "kube-system"));
        assert!(!glob_match("kube-*", "my-kube-system"));
        assert!(glob_match("*-system", "kube-system"));
        assert!(!glob_match("*-system", "kube-system-x"));
        assert!(glob_match("a*a", "aa"));
        assert!(!glob_match("a*a", "a"));
        assert!(glob_match("**", ""));
        assert!(glob_match("a**b", "ab"));
    }

    #[test]
    fn glob_match_question_mark_inside_segments() {
        assert!(glob_match("*-?-*", "web-1-prod"));
        assert!(!glob_match("*-?-*", "web-12-prod"));
    }

    #[test]
    fn wildcard_folds_case_when_requested() {
        assert!(wildcard("Kyv*", "kyverno", true));
        assert!(!wildcard("Kyv*", "kyverno", false));
    }

    #[test]
    fn glob_match_empty_pattern() {
        assert!(glob_match("", ""));
        assert!(!glob_match("", "text"));
    }

    #[test]
    fn ruleset_deserializes_from_yaml() {
        let yaml = "include: [\"team-*\"]\nselector:\n  team: a\n";
        let r: RuleSet = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(r.include, vec!["team-*"]);
        assert!(r.exclude.is_empty());
        assert_eq!(r.selector.get("team").map(String::as_str), Some("a"));
    }
}
