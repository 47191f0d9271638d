mod bytes_tests;
mod parser_tests;
mod reconcile_tests;
