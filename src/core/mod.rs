pub mod extract;
pub mod pipeline;
pub mod render;
pub mod rewrite;
pub mod rules;
pub mod selector;
pub mod style;
pub mod template;
