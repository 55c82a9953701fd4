macro_rules! assert_proxy_err {
    ($expected:expr, $result:expr) => {
        assert_eq!($expected, $result.downcast::<ProxyError>().expect("ProxyError expected").to_string())
    };
}

pub(crate) use assert_proxy_err;
