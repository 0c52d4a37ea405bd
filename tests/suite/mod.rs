mod bootstrap;
mod cli;
