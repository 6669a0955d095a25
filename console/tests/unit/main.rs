mod support;

mod test_controller;
