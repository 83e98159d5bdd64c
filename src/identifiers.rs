//! Display formatting for CPF/CNPJ identifiers. Linkage compares raw text;
//! these are only applied when rendering values for documents.

fn digits_padded(raw: &str, width: usize) -> Option<String> {
    let cleaned = raw.trim().trim_start_matches('\'');
    let digits: String = cleaned.chars().filter(|c| c.is_ascii_digit()).collect();
    if digits.is_empty() || digits.len() > width {
        return None;
    }
    Some(format!("{digits:0>width$}"))
}

/// `xxx.xxx.xxx-xx`, or the input unchanged when it cannot be a CPF.
pub fn format_cpf(raw: &str) -> String {
    match digits_padded(raw, 11) {
        Some(d) => format!("{}.{}.{}-{}", &d[..3], &d[3..6], &d[6..9], &d[9..]),
        None => raw.to_string(),
    }
}

/// `xx.xxx.xxx/xxxx-xx`, or the input unchanged when it cannot be a CNPJ.
pub fn format_cnpj(raw: &str) -> String {
    match digits_padded(raw, 14) {
        Some(d) => format!(
            "{}.{}.{}/{}-{}",
            &d[..2],
            &d[2..5],
            &d[5..8],
            &d[8..12],
            &d[12..]
        ),
        None => raw.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cpf_is_padded_and_punctuated() {
        assert_eq!(format_cpf("12345678901"), "123.456.789-01");
        assert_eq!(format_cpf("'1234567890"), "012.345.678-90");
        assert_eq!(format_cpf(" 123.456.789-01 "), "123.456.789-01");
        assert_eq!(format_cpf("123456789012"), "123456789012");
        assert_eq!(format_cpf(""), "");
    }

    #[test]
    fn cnpj_is_padded_and_punctuated() {
        assert_eq!(format_cnpj("12345678000190"), "12.345.678/0001-90");
        assert_eq!(format_cnpj("1234567000190"), "01.234.567/0001-90");
        assert_eq!(format_cnpj("sem cnpj"), "sem cnpj");
    }
}
