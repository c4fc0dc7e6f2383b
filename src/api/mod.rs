pub mod mobilenet;
