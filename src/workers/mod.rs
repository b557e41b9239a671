// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

/// 工作器模块
///
/// 浏览器工作者、抓取编排器以及后台清理任务
pub mod browser_worker;
pub mod orchestrator;
pub mod retry_queue_worker;
pub mod session_sweeper;
pub mod worker;

pub use worker::Worker;
