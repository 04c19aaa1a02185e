pub mod augment;
pub mod batch;
pub mod circleci;
pub mod cli;
pub mod db;
pub mod detect;
pub mod error;
pub mod files;
pub mod github;
pub mod merge;
pub mod model;
pub mod normalize;
pub mod parsers;
pub mod pipeline;
pub mod postgrest;
pub mod rollup;
pub mod sources;
pub mod store;
