/// Connect to a DNP photo printer and ask it for its remaining media.
pub mod printer;
