#[cfg(test)]
mod __test__ {
  use crate::header::{parse, Command, HeaderError, Protocol};

  #[test]
  fn test_data_with_size() {
    let h = parse(b"DATA k g d n 11\n").unwrap();
    assert_eq!(h.command, Command::Data);
    assert_eq!((h.key, h.group, h.dir, h.name), ("k", "g", "d", "n"));
    assert_eq!(h.size, Some(11));
    assert_eq!(h.protocol(), Protocol::Sized(11));
    assert_eq!(h.new_name, None);
  }

  #[test]
  fn test_data_without_size_is_line_protocol() {
    let h = parse(b"DATA k g d n\r\n").unwrap();
    assert_eq!(h.name, "n");
    assert_eq!(h.protocol(), Protocol::Lines);

    let h = parse(b"DATA k g d n 0").unwrap();
    assert_eq!(h.protocol(), Protocol::Lines);

    let h = parse(b"DATA k g d n ").unwrap();
    assert_eq!(h.size, None);
  }

  #[test]
  fn test_rotate_with_new_name() {
    let h = parse(b"ROTATE k g d n newn\n").unwrap();
    assert_eq!(h.command, Command::Rotate);
    assert_eq!(h.new_name, Some("newn"));
    assert_eq!(h.size, None);

    let h = parse(b"ROTATE k g d n\n").unwrap();
    assert_eq!(h.new_name, None);
  }

  #[test]
  fn test_unknown_command_is_parsed_not_rejected() {
    let h = parse(b"PING k g d n whatever\n").unwrap();
    assert_eq!(h.command, Command::Other("PING"));
    assert_eq!(h.size, None);
    assert_eq!(h.new_name, None);
  }

  #[test]
  fn test_missing_fields() {
    match parse(b"DATA k g\n") {
      Err(HeaderError::Missing { field, line }) => {
        assert_eq!(field, "dirname");
        assert_eq!(line, "DATA k g");
      },
      other => panic!("unexpected {:?}", other),
    }
    assert!(matches!(
      parse(b"DATA\n"),
      Err(HeaderError::Missing { field: "command", .. })
    ));
  }

  #[test]
  fn test_malformed_size() {
    match parse(b"DATA k g d n 12abc\n") {
      Err(HeaderError::MalformedSize { size, .. }) => assert_eq!(size, "12abc"),
      other => panic!("unexpected {:?}", other),
    }
    assert!(parse(b"DATA k g d n -5\n").is_err());
  }

  #[test]
  fn test_non_utf8_header() {
    assert!(matches!(parse(b"DATA k g \xff n\n"), Err(HeaderError::NotUtf8)));
  }
}
