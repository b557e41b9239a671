// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

/// 号码最少位数，少于该位数的不做查询
pub const MIN_PHONE_DIGITS: usize = 7;

/// 规范化电话号码
///
/// 去掉空格、括号、横线等格式字符，并把国际前缀（`+27…` / `0027…` / `27…`）
/// 转成本地 `0…` 形式。结果作为缓存键和查询参数。
///
/// # 参数
///
/// * `raw` - 原始号码
/// * `country_code` - 国家区号（不含 +），例如 `27`
///
/// # 返回值
///
/// * `Some(String)` - 规范化后的号码
/// * `None` - 数字位数不足，无法查询
pub fn normalize_phone(raw: &str, country_code: &str) -> Option<String> {
    let trimmed = raw.trim();
    let international = trimmed.starts_with('+');
    let digits: String = trimmed.chars().filter(|c| c.is_ascii_digit()).collect();

    let local = if !country_code.is_empty() {
        let double_zero = format!("00{}", country_code);
        if let Some(rest) = digits.strip_prefix(&double_zero) {
            format!("0{}", rest.trim_start_matches('0'))
        } else if international {
            match digits.strip_prefix(country_code) {
                Some(rest) => format!("0{}", rest.trim_start_matches('0')),
                None => digits,
            }
        } else if digits.len() > 10 && digits.starts_with(country_code) {
            format!("0{}", &digits[country_code.len()..])
        } else {
            digits
        }
    } else {
        digits
    };

    if local.len() < MIN_PHONE_DIGITS {
        None
    } else {
        Some(local)
    }
}
