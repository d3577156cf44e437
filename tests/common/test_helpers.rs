/// Common test helper functions
use std::fs;
use std::io::Read;

/// Verify that every byte in `data` equals `byte`
pub fn all_bytes_are(data: &[u8], byte: u8) -> bool {
    data.iter().all(|&b| b == byte)
}

/// Verify that a file contains only zeros
pub fn verify_all_zeros(path: &std::path::Path) -> std::io::Result<bool> {
    let mut file = fs::File::open(path)?;
    let mut buffer = vec![0u8; 4096];

    loop {
        let bytes_read = file.read(&mut buffer)?;
        if bytes_read == 0 {
            break;
        }
        if !all_bytes_are(&buffer[..bytes_read], 0) {
            return Ok(false);
        }
    }

    Ok(true)
}

/// Shannon entropy of `data` in bits per byte
pub fn entropy(data: &[u8]) -> f64 {
    let mut counts = [0u64; 256];
    for &byte in data {
        counts[byte as usize] += 1;
    }

    let length = data.len() as f64;
    let mut entropy = 0.0;

    for &count in &counts {
        if count > 0 {
            let probability = count as f64 / length;
            entropy -= probability * probability.log2();
        }
    }

    entropy
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_verify_all_zeros() {
        let mut temp = NamedTempFile::new().unwrap();
        temp.write_all(&vec![0u8; 1024]).unwrap();
        temp.flush().unwrap();

        assert!(verify_all_zeros(temp.path()).unwrap());
    }

    #[test]
    fn test_entropy_bounds() {
        assert!(entropy(&[0u8; 1000]) < 0.1);

        let uniform: Vec<u8> = (0..=255u8).cycle().take(256 * 16).collect();
        assert!((entropy(&uniform) - 8.0).abs() < 1e-9);
    }
}
