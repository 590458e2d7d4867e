mod app;
mod bisect;
mod bundler;
mod check;
mod config;
mod error;
mod git;
mod logs;
mod oracle;
mod paths;
mod process;
mod rebaser;
mod runlog;
mod types;
mod upgrade;
mod workflow;

fn main() {
    std::process::exit(app::run());
}
