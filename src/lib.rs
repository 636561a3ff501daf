//! Single-guild Discord music bot: slash commands in, queued yt-dlp
//! resolution and songbird playback out.
//!
//! The interesting part lives in [`session`]: a per-guild controller that
//! serializes every command and lifecycle event onto one task, so playback
//! state can never be advanced twice by a race between a finished track and
//! an explicit skip or stop.

pub mod bot;
pub mod config;
pub mod error;
pub mod gateway;
pub mod resolver;
pub mod session;
pub mod storage;
pub mod voice;
