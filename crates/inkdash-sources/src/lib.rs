//! Content-source integrations for the inkdash rotation: a directory
//! slideshow, a now-playing card for a local media player, and a weather
//! widget. Each implements the `ContentSource` contract from
//! `inkdash-core` and keeps its own cadence and de-duplication state.

pub mod nowplaying;
pub mod slideshow;
pub mod weather;

pub use nowplaying::{NowPlaying, NowPlayingClient, NowPlayingSource, StatusFileClient};
pub use slideshow::SlideshowSource;
pub use weather::WeatherSource;
