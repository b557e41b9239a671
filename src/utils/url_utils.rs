// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use url::{ParseError, Url};

/// 将可能为相对路径的URL转换为绝对路径URL
pub fn resolve_url(base_url: &Url, path: &str) -> Result<Url, ParseError> {
    base_url.join(path)
}

/// 构造地图搜索地址，查询词为 `"<industry> in <town>"`
///
/// # 参数
///
/// * `base` - 搜索基础地址，例如 `https://www.google.com/maps/search/`
/// * `industry` - 行业
/// * `town` - 城镇
pub fn maps_search_url(base: &str, industry: &str, town: &str) -> Result<String, ParseError> {
    let mut base = Url::parse(base)?;
    if !base.path().ends_with('/') {
        let path = format!("{}/", base.path());
        base.set_path(&path);
    }
    let query = format!("{} in {}", industry.trim(), town.trim());
    let url = base.join(&urlencoding::encode(&query))?;
    Ok(url.to_string())
}

/// 从地图搜索地址中还原 `(industry, town)`
pub fn parse_maps_query(url: &str) -> Option<(String, String)> {
    let parsed = Url::parse(url).ok()?;
    let last = parsed.path_segments()?.filter(|s| !s.is_empty()).last()?;
    let decoded = urlencoding::decode(last).ok()?;
    let (industry, town) = decoded.split_once(" in ")?;
    Some((industry.to_string(), town.to_string()))
}

/// 用号码填充查询地址模板中的 `{phone}`
pub fn lookup_url(template: &str, phone: &str) -> String {
    template.replace("{phone}", &urlencoding::encode(phone))
}
