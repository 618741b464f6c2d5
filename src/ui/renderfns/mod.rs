pub mod footer;
pub mod header;
pub mod utils;

pub use footer::draw_footer;
pub use header::{draw_header, extract_domain};
pub use utils::{centered_rect, list_block, overlay_area, status_color, status_label, truncate};
