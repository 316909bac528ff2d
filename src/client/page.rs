//! Lazily continuable collection pages.

// crates.io
use futures::{
	Stream, TryStreamExt,
	stream::{self, Iter},
};
use serde::de::DeserializeOwned;
use tokio::runtime::Handle;
// self
use crate::{_prelude::*, client::ApiClient, http::HttpTransport};

/// One response's worth of decoded items plus the link to the next page, if any.
///
/// Pages are immutable snapshots. Fetching a successor never mutates the current page, so a
/// traversal can restart from any page previously returned.
pub struct Page<T, C>
where
	C: ?Sized + HttpTransport,
{
	client: ApiClient<C>,
	items: Vec<T>,
	next: Option<Url>,
}
impl<T, C> Page<T, C>
where
	C: ?Sized + HttpTransport,
{
	pub(crate) fn new(client: ApiClient<C>, items: Vec<T>, next: Option<Url>) -> Self {
		Self { client, items, next }
	}

	/// Items of this page in server order.
	pub fn items(&self) -> &[T] {
		&self.items
	}

	/// Consumes the page, returning its items.
	pub fn into_items(self) -> Vec<T> {
		self.items
	}

	/// Target of the `rel="next"` link, if the server sent one.
	pub fn next_link(&self) -> Option<&Url> {
		self.next.as_ref()
	}

	/// Returns `true` if a successor page exists.
	pub fn has_next(&self) -> bool {
		self.next.is_some()
	}

	/// Fetches the successor page, or returns an empty terminal page when there is none.
	pub async fn next_page(&self) -> Result<Page<T, C>>
	where
		T: DeserializeOwned,
	{
		match &self.next {
			Some(uri) => self.client.fetch_page(uri.clone()).await,
			None => Ok(Page::new(self.client.clone(), Vec::new(), None)),
		}
	}

	/// Collects this page and every successor, fetching them strictly one after another.
	pub async fn read_to_end(self) -> Result<Vec<T>>
	where
		T: DeserializeOwned,
	{
		let mut collected = Vec::new();
		let mut page = self;

		loop {
			collected.append(&mut page.items);

			match page.next.take() {
				Some(uri) => page = page.client.fetch_page(uri).await?,
				None => return Ok(collected),
			}
		}
	}

	/// Converts the traversal into a stream of items; each successor is requested only once the
	/// items before it have been consumed.
	pub fn into_stream(self) -> impl Stream<Item = Result<T>>
	where
		T: DeserializeOwned,
	{
		stream::try_unfold(Cursor::Loaded(self), Cursor::advance).try_flatten()
	}

	/// Blocking variant of [`Page::read_to_end`] that drives the traversal on `handle`.
	///
	/// This parks the calling thread until the last page arrives. It panics when called from
	/// within an asynchronous execution context; use [`Page::read_to_end`] there.
	pub fn blocking_read_to_end(self, handle: &Handle) -> Result<Vec<T>>
	where
		T: DeserializeOwned,
	{
		handle.block_on(self.read_to_end())
	}
}
impl<T, C> Debug for Page<T, C>
where
	T: Debug,
	C: ?Sized + HttpTransport,
{
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("Page").field("items", &self.items).field("next", &self.next).finish()
	}
}

type Items<T> = Iter<std::vec::IntoIter<Result<T>>>;

enum Cursor<T, C>
where
	C: ?Sized + HttpTransport,
{
	Loaded(Page<T, C>),
	Pending(ApiClient<C>, Url),
	Exhausted,
}
impl<T, C> Cursor<T, C>
where
	T: DeserializeOwned,
	C: ?Sized + HttpTransport,
{
	async fn advance(self) -> Result<Option<(Items<T>, Self)>> {
		let mut page = match self {
			Cursor::Loaded(page) => page,
			Cursor::Pending(client, uri) => client.fetch_page(uri).await?,
			Cursor::Exhausted => return Ok(None),
		};
		let items = page.items.drain(..).map(Ok).collect::<Vec<_>>();
		let next = match page.next.take() {
			Some(uri) => Cursor::Pending(page.client, uri),
			None => Cursor::Exhausted,
		};

		Ok(Some((stream::iter(items), next)))
	}
}
