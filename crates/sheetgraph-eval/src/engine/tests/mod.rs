mod build;
mod common;
mod cycles;
mod evaluation;
