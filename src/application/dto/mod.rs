// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

/// 数据传输对象模块
///
/// 调用方提交的抓取任务在这里校验并转换为领域对象
pub mod start_scrape_request;
