/// Display version information
pub fn execute() {
    println!("foldvault {}", env!("CARGO_PKG_VERSION"));
    println!("Local accumulator of folded membership proofs");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version_execute() {
        // Version command should not panic
        execute();
    }
}
