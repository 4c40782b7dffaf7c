//! nlpipe - message-driven linguistic annotation service.
//!
//! Documents arrive on a broker queue, run through a staged NLP pipeline
//! (sentence segmentation, tokenization, part-of-speech tagging, named-entity
//! recognition, optional dependency parsing) on a bounded pool of annotators,
//! and leave as JSON results on an output queue.

pub mod cli;
pub mod config;
pub mod models;
pub mod services;
pub mod work_queue;
