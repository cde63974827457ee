use util::Error;

lazy_static! {
    // ErrInvalidComponentCount indicates add_stream was asked for a component
    // count other than 1; this core supports exactly one component per stream.
    pub static ref ERR_INVALID_COMPONENT_COUNT: Error =
        Error::new("n_components must be 1".to_owned());

    // ErrSocketAllocation indicates the socket factory failed to bind a host
    // candidate's socket. Fatal to the add_stream call that triggered it.
    pub static ref ERR_SOCKET_ALLOCATION: Error =
        Error::new("failed to allocate a socket for a host candidate".to_owned());
}

pub type Result<T> = std::result::Result<T, Error>;
