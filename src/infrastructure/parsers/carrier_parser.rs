// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use scraper::{Html, Selector};

/// 已知运营商名称（用于规范化页面上的各种写法）
const KNOWN_CARRIERS: &[(&str, &str)] = &[
    ("vodacom", "Vodacom"),
    ("mtn", "MTN"),
    ("cell c", "Cell C"),
    ("cellc", "Cell C"),
    ("telkom", "Telkom"),
    ("rain", "Rain"),
    ("liquid", "Liquid"),
];

const LABEL_PREFIXES: &[&str] = &["network:", "carrier:", "operator:", "provider:"];

/// 运营商查询结果解析器
pub struct CarrierParser {
    selectors: Vec<Selector>,
}

impl CarrierParser {
    /// # 参数
    ///
    /// * `result_selector` - 逗号分隔的候选选择器，按顺序尝试
    pub fn new(result_selector: &str) -> Self {
        let selectors = result_selector
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .filter_map(|s| Selector::parse(s).ok())
            .collect();
        Self { selectors }
    }

    /// 从查询结果页中提取运营商
    ///
    /// # 返回值
    ///
    /// * `Some(String)` - 运营商名称
    /// * `None` - 结果元素缺失或为空
    pub fn parse(&self, html: &str) -> Option<String> {
        let document = Html::parse_document(html);
        let text = self.selectors.iter().find_map(|selector| {
            document
                .select(selector)
                .map(|el| {
                    el.text()
                        .collect::<Vec<_>>()
                        .join(" ")
                        .split_whitespace()
                        .collect::<Vec<_>>()
                        .join(" ")
                })
                .find(|t| !t.is_empty())
        })?;

        Some(canonical_carrier(&text))
    }
}

/// 规范化运营商名称
pub fn canonical_carrier(text: &str) -> String {
    let lower = text.to_lowercase();
    if let Some((_, name)) = KNOWN_CARRIERS
        .iter()
        .find(|(needle, _)| contains_word(&lower, needle))
    {
        return (*name).to_string();
    }

    let mut cleaned = text.trim();
    for prefix in LABEL_PREFIXES {
        let has_prefix = cleaned
            .get(..prefix.len())
            .is_some_and(|head| head.eq_ignore_ascii_case(prefix));
        if has_prefix {
            cleaned = cleaned[prefix.len()..].trim();
        }
    }
    cleaned.chars().take(64).collect()
}

fn contains_word(haystack: &str, needle: &str) -> bool {
    haystack.match_indices(needle).any(|(i, _)| {
        let before = haystack[..i].chars().next_back();
        let after = haystack[i + needle.len()..].chars().next();
        before.is_none_or(|c| !c.is_alphanumeric()) && after.is_none_or(|c| !c.is_alphanumeric())
    })
}
