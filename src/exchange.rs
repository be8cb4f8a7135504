//! One request paired with its response.

use crate::middleware::HookedResponse;
use crate::request::Request;
use crate::transport::ServerResponse;

/// The unit of work handed through the middleware stack.
///
/// Owns the request (including its property bag) and the hooked response
/// for as long as the pipeline runs. Dropped once the response has been
/// sent.
#[derive(Debug)]
pub struct Exchange {
    request: Request,
    response: HookedResponse<ServerResponse>,
}

impl Exchange {
    pub fn new(request: Request) -> Self {
        Self { request, response: HookedResponse::new(ServerResponse::new()) }
    }

    pub fn request(&self) -> &Request { &self.request }
    pub fn request_mut(&mut self) -> &mut Request { &mut self.request }
    pub fn response(&self) -> &HookedResponse<ServerResponse> { &self.response }
    pub fn response_mut(&mut self) -> &mut HookedResponse<ServerResponse> { &mut self.response }

    /// Both halves at once, for stages that read one while writing the other.
    pub fn parts_mut(&mut self) -> (&mut Request, &mut HookedResponse<ServerResponse>) {
        (&mut self.request, &mut self.response)
    }

    pub fn into_parts(self) -> (Request, HookedResponse<ServerResponse>) {
        (self.request, self.response)
    }
}
