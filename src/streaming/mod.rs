mod handlers;
mod page;
mod server;
#[cfg(test)]
mod tests;

pub use server::{load_index_page, router, ServerState, StreamServer, StreamServerBuilder};
