mod audio;
mod config;
mod control;
mod input;
mod library;
mod rfid;
mod runtime;
mod system;

#[cfg(test)]
mod test_support;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    runtime::run()
}
