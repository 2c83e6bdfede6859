// Services Layer - logic shared by the CLI and the HTTP API

pub mod stats_service;

pub use stats_service::{render_text_report, RoomStatsReport, StatsService};
