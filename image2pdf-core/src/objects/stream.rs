use crate::compression;
use crate::error::{PdfError, Result};
use crate::objects::{Dictionary, Object};

/// A stream object: a dictionary followed by raw (possibly encoded) bytes.
#[derive(Debug, Clone, PartialEq)]
pub struct Stream {
    dictionary: Dictionary,
    data: Vec<u8>,
}

impl Stream {
    pub fn new(data: Vec<u8>) -> Self {
        Self::with_dictionary(Dictionary::new(), data)
    }

    /// Build a stream, overriding any `Length` in `dictionary` with the data length.
    pub fn with_dictionary(mut dictionary: Dictionary, data: Vec<u8>) -> Self {
        dictionary.set("Length", data.len() as i64);
        Self { dictionary, data }
    }

    pub fn dictionary(&self) -> &Dictionary {
        &self.dictionary
    }

    pub fn dictionary_mut(&mut self) -> &mut Dictionary {
        &mut self.dictionary
    }

    /// Raw bytes as stored in the file.
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn into_parts(self) -> (Dictionary, Vec<u8>) {
        (self.dictionary, self.data)
    }

    /// Compress the data with FlateDecode and update `Length` and `Filter`.
    pub fn compress_flate(&mut self) -> Result<()> {
        if !self.filters().is_empty() {
            return Err(PdfError::CompressionError(
                "stream is already encoded".to_string(),
            ));
        }

        self.data = compression::compress(&self.data)?;
        self.dictionary.set("Length", self.data.len() as i64);
        self.dictionary.set("Filter", Object::name("FlateDecode"));
        Ok(())
    }

    /// Names of the filters applied to this stream, outermost first.
    pub fn filters(&self) -> Vec<String> {
        match self.dictionary.get("Filter") {
            Some(Object::Name(name)) => vec![name.clone()],
            Some(Object::Array(items)) => items
                .iter()
                .filter_map(|item| item.as_name().map(str::to_string))
                .collect(),
            _ => Vec::new(),
        }
    }

    /// Decode the stream data. Only FlateDecode is understood; other filters
    /// are reported as an error rather than silently passed through.
    pub fn decoded_data(&self) -> Result<Vec<u8>> {
        let mut data = self.data.clone();
        for filter in self.filters() {
            data = match filter.as_str() {
                "FlateDecode" => compression::decompress(&data)?,
                other => {
                    return Err(PdfError::CompressionError(format!(
                        "unsupported stream filter: {other}"
                    )))
                }
            };
        }
        Ok(data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stream_new_sets_length() {
        let stream = Stream::new(vec![1, 2, 3, 4, 5]);
        assert_eq!(stream.dictionary().get_integer("Length"), Some(5));
        assert!(stream.filters().is_empty());
    }

    #[test]
    fn test_with_dictionary_overrides_length() {
        let mut dict = Dictionary::new();
        dict.set("Length", 999);
        dict.set("Subtype", Object::name("Image"));

        let stream = Stream::with_dictionary(dict, vec![0xFF, 0xD8, 0xFF]);
        assert_eq!(stream.dictionary().get_integer("Length"), Some(3));
        assert_eq!(stream.dictionary().get_name("Subtype"), Some("Image"));
    }

    #[test]
    fn test_compress_then_decode() {
        let content = b"q 100 0 0 50 0 0 cm /Im0 Do Q".repeat(20);
        let mut stream = Stream::new(content.clone());
        stream.compress_flate().unwrap();

        assert_eq!(stream.filters(), vec!["FlateDecode".to_string()]);
        assert_eq!(
            stream.dictionary().get_integer("Length"),
            Some(stream.data().len() as i64)
        );
        assert!(stream.data().len() < content.len());
        assert_eq!(stream.decoded_data().unwrap(), content);
    }

    #[test]
    fn test_compress_twice_is_rejected() {
        let mut stream = Stream::new(b"abc".to_vec());
        stream.compress_flate().unwrap();
        assert!(stream.compress_flate().is_err());
    }

    #[test]
    fn test_unknown_filter_fails_to_decode() {
        let mut dict = Dictionary::new();
        dict.set("Filter", Object::name("DCTDecode"));
        let stream = Stream::with_dictionary(dict, vec![0xFF, 0xD8]);
        assert!(stream.decoded_data().is_err());
    }
}
