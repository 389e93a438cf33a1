use crate::scrapers::Region;

pub mod hindustan_times;
pub mod inshorts;

pub use hindustan_times::HindustanTimesScraper;
pub use inshorts::InshortsScraper;

pub const REGION: Region = Region {
    name: "india",
    emoji: "🇮🇳",
};
