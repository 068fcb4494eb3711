mod common;

mod install_flow;
