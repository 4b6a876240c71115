pub mod footer;
pub mod header;
pub mod overlay;
pub mod utils;

pub use footer::draw_footer;
pub use header::{draw_header, draw_offline_banner};
pub use overlay::draw_input_overlay;
pub use utils::{fetch_indicator, page_numbers, truncate, PageItem};
