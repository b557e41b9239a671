// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

/// 应用程序模块
///
/// 包含抓取会话的用例实现，负责协调领域服务、编排器和持久化
pub mod dto;
pub mod usecases;
