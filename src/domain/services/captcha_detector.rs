// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use regex::{Regex, RegexBuilder};

// 常见的人机验证页面特征
const PATTERNS: &[&str] = &[
    r"g-recaptcha",
    r"recaptcha/api",
    r"h-captcha|hcaptcha\.com",
    r"cf-challenge|challenge-platform|cf-turnstile",
    r"<title>[^<]*(captcha|attention required|just a moment)[^<]*</title>",
    r"unusual traffic from your computer",
    r"/sorry/index",
    r"verify (that )?you are (a )?human",
];

/// 人机验证检测器
///
/// 基于页面内容的启发式判断，只能尽力而为
pub struct CaptchaDetector {
    enabled: bool,
    patterns: Vec<Regex>,
}

impl CaptchaDetector {
    pub fn new(enabled: bool) -> Self {
        let patterns = PATTERNS
            .iter()
            .filter_map(|p| RegexBuilder::new(p).case_insensitive(true).build().ok())
            .collect();
        Self { enabled, patterns }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// 页面内容是否像人机验证页面
    pub fn detect(&self, html: &str) -> bool {
        self.patterns.iter().any(|re| re.is_match(html))
    }
}
