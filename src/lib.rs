pub mod api;
pub mod app;
pub mod cli;
pub mod config;
pub mod controller;
pub mod events;
pub mod export;
pub mod pager;
pub mod selection;
pub mod storage;

#[cfg(test)]
mod tests;
