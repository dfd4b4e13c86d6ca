mod app;
mod message;
mod ui;

pub use app::run;
