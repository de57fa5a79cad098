pub mod book_feed;

pub use book_feed::{parse_book_message, BookFeedClient, ConnectionState, FeedStats};
