mod common;
mod control_test;
mod timing_test;
