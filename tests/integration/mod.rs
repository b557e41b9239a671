// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

pub mod orchestrator_test;
pub mod provider_lookup_test;
pub mod repositories_test;
pub mod retry_queue_worker_test;
pub mod session_service_test;
