use std::process::exit;

use bumpalo::Bump;

const ARENA_SIZE: usize = 1 << 20;

fn main() {
    let bump = Bump::with_capacity(ARENA_SIZE);
    bump.set_allocation_limit(Some(ARENA_SIZE));
    let result = pebble::run(&bump, std::env::args_os());
    match result {
        Ok(status) => exit(status),
        Err(err) => {
            err.print();
            exit(err.exit_code())
        }
    }
}
