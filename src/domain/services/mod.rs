// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

pub mod batch_manager;
pub mod captcha_detector;
pub mod provider_lookup_service;
pub mod retry_strategy;
pub mod scrape_control;
pub mod session_store;
