use std::fmt::Display;

pub fn human_size(size: u64) -> String {
    if size < 2048 {
        format!("{size} B")
    } else if size < 2 * 1024 * 1024 {
        format!("{:.2} KiB", size as f64 / 1024.0)
    } else if size < 2 * 1024 * 1024 * 1024 {
        format!("{:.2} MiB", size as f64 / (1024 * 1024) as f64)
    } else {
        format!("{:.2} GiB", size as f64 / (1024 * 1024 * 1024) as f64)
    }
}

pub fn format_comma_delimited<I: IntoIterator<Item = T>, T: Display>(items: I) -> String {
    items
        .into_iter()
        .map(|item| item.to_string())
        .collect::<Vec<_>>()
        .join(",")
}

#[cfg(test)]
mod tests {
    use crate::common::format::{format_comma_delimited, human_size};

    #[test]
    fn test_sizes() {
        assert_eq!(human_size(0).as_str(), "0 B");
        assert_eq!(human_size(1).as_str(), "1 B");
        assert_eq!(human_size(1230).as_str(), "1230 B");
        assert_eq!(human_size(300_000).as_str(), "292.97 KiB");
        assert_eq!(human_size(50_000_000).as_str(), "47.68 MiB");
        assert_eq!(human_size(500_250_000_000).as_str(), "465.89 GiB");
    }

    #[test]
    fn test_comma_delimited() {
        assert_eq!(format_comma_delimited(Vec::<u32>::new()), "");
        assert_eq!(format_comma_delimited(["0", "2", "3"]), "0,2,3");
    }
}
