pub mod document_number_sequence;
pub mod document_type;
