// Report assembly and storage.
// The DOCX is built in memory, then written once under the reports directory
// and served back by filename.

pub mod document;
pub mod handlers;
pub mod store;
