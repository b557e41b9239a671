// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use url::Url;

use crate::domain::models::business::ScrapedBusiness;
use crate::utils::url_utils::resolve_url;

/// 结果面板选择器
pub const FEED_SELECTOR: &str = "div[role='feed']";

/// 滚动结果面板并统计卡片数量的脚本，返回 `{count, end}`
pub const SCROLL_FEED_SCRIPT: &str = r#"(() => {
  const feed = document.querySelector("div[role='feed']");
  if (!feed) { return { count: 0, end: true }; }
  feed.scrollTop = feed.scrollHeight;
  const count = feed.querySelectorAll("div.Nv2PK").length;
  const end = !!document.querySelector("span.HlvSq")
    || /reached the end of the list/i.test(feed.innerText || "");
  return { count: count, end: end };
})()"#;

// 按优先级排列，前面的没匹配到才尝试后面的
const CARD_SELECTORS: &[&str] = &["div[role='feed'] div.Nv2PK", "div.Nv2PK", "div[role='article']"];
const NAME_LINK_SELECTORS: &[&str] = &["a.hfpxzc[aria-label]", "a[href*='/maps/place/'][aria-label]"];
const NAME_TEXT_SELECTORS: &[&str] = &[".qBF1Pd", ".fontHeadlineSmall", "[role='heading']"];
const PLACE_LINK_SELECTORS: &[&str] = &["a.hfpxzc", "a[href*='/maps/place/']"];
const PHONE_SELECTORS: &[&str] = &["span.UsdlK", "[data-phone]"];
const INFO_SELECTORS: &[&str] = &[".W4Efsd"];

fn compile(list: &[&str]) -> Vec<Selector> {
    list.iter().filter_map(|s| Selector::parse(s).ok()).collect()
}

fn clean_text(element: ElementRef<'_>) -> String {
    element
        .text()
        .collect::<Vec<_>>()
        .join(" ")
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// 地图列表卡片解析器
///
/// 把滚动加载完成后的页面 HTML 解析为商家记录。没有名称的卡片会被丢弃；
/// 不做去重。
pub struct ListingParser {
    base_url: Option<Url>,
    cards: Vec<Selector>,
    name_links: Vec<Selector>,
    name_texts: Vec<Selector>,
    place_links: Vec<Selector>,
    phones: Vec<Selector>,
    info_lines: Vec<Selector>,
    phone_pattern: Option<Regex>,
}

impl ListingParser {
    /// # 参数
    ///
    /// * `base_url` - 用于把相对链接转换为绝对地址
    pub fn new(base_url: &str) -> Self {
        Self {
            base_url: Url::parse(base_url).ok(),
            cards: compile(CARD_SELECTORS),
            name_links: compile(NAME_LINK_SELECTORS),
            name_texts: compile(NAME_TEXT_SELECTORS),
            place_links: compile(PLACE_LINK_SELECTORS),
            phones: compile(PHONE_SELECTORS),
            info_lines: compile(INFO_SELECTORS),
            phone_pattern: Regex::new(r"(\+?\d[\d\s\-()]{5,}\d)").ok(),
        }
    }

    /// 解析页面中的全部卡片
    pub fn parse(&self, html: &str, town: &str, industry: &str) -> Vec<ScrapedBusiness> {
        let document = Html::parse_document(html);

        for selector in &self.cards {
            let cards: Vec<ElementRef<'_>> = document.select(selector).collect();
            if cards.is_empty() {
                continue;
            }
            return cards
                .into_iter()
                .filter_map(|card| self.parse_card(card, town, industry))
                .collect();
        }

        Vec::new()
    }

    fn parse_card(
        &self,
        card: ElementRef<'_>,
        town: &str,
        industry: &str,
    ) -> Option<ScrapedBusiness> {
        let name = self.extract_name(card)?;
        let info = self.info_segments(card);
        let phone = self.extract_phone(card, &info);
        let address = self.extract_address(&info, phone.as_deref());

        Some(ScrapedBusiness {
            maps_url: self.extract_url(card).unwrap_or_default(),
            name,
            phone,
            provider: String::new(),
            address,
            town: town.to_string(),
            industry: industry.to_string(),
        })
    }

    fn extract_name(&self, card: ElementRef<'_>) -> Option<String> {
        let from_label = self.name_links.iter().find_map(|selector| {
            card.select(selector)
                .filter_map(|a| a.value().attr("aria-label"))
                .map(|label| label.trim().to_string())
                .find(|label| !label.is_empty())
        });

        from_label.or_else(|| {
            self.name_texts.iter().find_map(|selector| {
                card.select(selector)
                    .map(clean_text)
                    .find(|text| !text.is_empty())
            })
        })
    }

    fn extract_url(&self, card: ElementRef<'_>) -> Option<String> {
        let href = self.place_links.iter().find_map(|selector| {
            card.select(selector)
                .filter_map(|a| a.value().attr("href"))
                .find(|href| !href.is_empty())
        })?;

        match &self.base_url {
            Some(base) => resolve_url(base, href).ok().map(|u| u.to_string()),
            None => Some(href.to_string()),
        }
    }

    fn info_segments(&self, card: ElementRef<'_>) -> Vec<String> {
        self.info_lines
            .iter()
            .flat_map(|selector| card.select(selector))
            // 只取最内层的信息行，避免父子行重复
            .filter(|line| {
                !self
                    .info_lines
                    .iter()
                    .any(|selector| line.select(selector).next().is_some())
            })
            .flat_map(|line| {
                clean_text(line)
                    .split('·')
                    .map(|s| s.trim().to_string())
                    .filter(|s| !s.is_empty())
                    .collect::<Vec<_>>()
            })
            .collect()
    }

    fn extract_phone(&self, card: ElementRef<'_>, info: &[String]) -> Option<String> {
        let tagged = self.phones.iter().find_map(|selector| {
            card.select(selector).find_map(|el| {
                el.value()
                    .attr("data-phone")
                    .map(|p| p.trim().to_string())
                    .or_else(|| Some(clean_text(el)))
                    .filter(|p| !p.is_empty())
            })
        });
        if tagged.is_some() {
            return tagged;
        }

        let pattern = self.phone_pattern.as_ref()?;
        info.iter().find_map(|segment| {
            pattern
                .find(segment)
                .map(|m| m.as_str().trim().to_string())
                .filter(|p| p.chars().filter(|c| c.is_ascii_digit()).count() >= 7)
        })
    }

    fn extract_address(&self, info: &[String], phone: Option<&str>) -> Option<String> {
        const STATUS_PREFIXES: &[&str] = &["Open", "Closed", "Opens", "Closes", "Temporarily"];

        info.iter()
            .filter(|segment| Some(segment.as_str()) != phone)
            .filter(|segment| !STATUS_PREFIXES.iter().any(|p| segment.starts_with(p)))
            .filter(|segment| {
                self.phone_pattern
                    .as_ref()
                    .is_none_or(|re| !re.is_match(segment))
            })
            // 地址通常含有数字或逗号，分类名不含
            .find(|segment| segment.chars().any(|c| c.is_ascii_digit()) || segment.contains(','))
            .cloned()
    }
}
