use crate::adapter::{rejected, BackendRequest, StoreAdapter};
use crate::backend::Backend;
use crate::error::{FetchError, Result};
use crate::models::{Address, Product, ProductsFilter, Review};
use crate::request_key::RequestKey;
use crate::store::{Reducer, Store};
use crate::throttle_config::ThrottleConfig;
use crate::throttler::Throttler;
use futures::future::{BoxFuture, FutureExt};
use serde::Serialize;
use serde_json::{json, Value};
use std::sync::Arc;
use tokio::sync::watch;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProductResource {
    Products,
    Product,
    RelatedProducts,
    Reviews,
    Addresses,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductLoading {
    pub products: bool,
    pub product: bool,
    pub related_products: bool,
    pub reviews: bool,
    pub addresses: bool,
}

impl ProductLoading {
    pub fn get(&self, resource: ProductResource) -> bool {
        match resource {
            ProductResource::Products => self.products,
            ProductResource::Product => self.product,
            ProductResource::RelatedProducts => self.related_products,
            ProductResource::Reviews => self.reviews,
            ProductResource::Addresses => self.addresses,
        }
    }

    fn set(&mut self, resource: ProductResource, value: bool) {
        match resource {
            ProductResource::Products => self.products = value,
            ProductResource::Product => self.product = value,
            ProductResource::RelatedProducts => self.related_products = value,
            ProductResource::Reviews => self.reviews = value,
            ProductResource::Addresses => self.addresses = value,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductState {
    pub error: Option<FetchError>,
    pub products: Vec<Product>,
    pub product: Option<Product>,
    pub related_products: Vec<Product>,
    pub reviews: Vec<Review>,
    pub addresses: Vec<Address>,
    pub loading: ProductLoading,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ProductAction {
    HasError(FetchError),
    SetLoading { key: ProductResource, value: bool },
    GetProductsSuccess(Vec<Product>),
    FilterProductsSuccess(Vec<Product>),
    GetProductSuccess(Product),
    GetRelatedProductsSuccess(Vec<Product>),
    GetProductReviewsSuccess(Vec<Review>),
    GetAddressesSuccess(Vec<Address>),
    AddAddressSuccess(Vec<Address>),
    EditAddressSuccess(Vec<Address>),
}

pub struct ProductReducer;

impl Reducer for ProductReducer {
    type State = ProductState;
    type Action = ProductAction;
    type Resource = ProductResource;

    fn reduce(state: &mut ProductState, action: ProductAction) {
        match action {
            ProductAction::HasError(err) => state.error = Some(err),
            ProductAction::SetLoading { key, value } => state.loading.set(key, value),
            ProductAction::GetProductsSuccess(products)
            | ProductAction::FilterProductsSuccess(products) => {
                state.products = products;
                state.loading.products = false;
            }
            ProductAction::GetProductSuccess(product) => {
                state.product = Some(product);
                state.loading.product = false;
            }
            ProductAction::GetRelatedProductsSuccess(products) => {
                state.related_products = products;
                state.loading.related_products = false;
            }
            ProductAction::GetProductReviewsSuccess(reviews) => {
                state.reviews = reviews;
                state.loading.reviews = false;
            }
            ProductAction::GetAddressesSuccess(addresses)
            | ProductAction::AddAddressSuccess(addresses)
            | ProductAction::EditAddressSuccess(addresses) => {
                state.addresses = addresses;
                state.loading.addresses = false;
            }
        }
    }

    fn set_loading(resource: ProductResource, value: bool) -> ProductAction {
        ProductAction::SetLoading { key: resource, value }
    }

    fn has_error(error: FetchError) -> ProductAction {
        ProductAction::HasError(error)
    }
}

/// Product catalogue, reviews and addresses backed by the REST API.
///
/// Dropping the context resets its throttler, clearing in-flight entries
/// and dispatch history, unless the throttler is still shared.
pub struct ProductContext {
    adapter: StoreAdapter<ProductReducer>,
}

impl ProductContext {
    pub fn new(backend: Arc<dyn Backend>, config: ThrottleConfig) -> Result<Self> {
        let throttler = Arc::new(Throttler::new(config)?);
        Ok(Self::with_throttler(backend, throttler))
    }

    /// Build on an explicitly shared throttler. Dedup and window state are
    /// shared with every other holder, and the throttler is only reset when
    /// the last holder drops.
    pub fn with_throttler(backend: Arc<dyn Backend>, throttler: Arc<Throttler<Value>>) -> Self {
        Self {
            adapter: StoreAdapter::new(Store::default(), throttler, backend),
        }
    }

    pub fn state(&self) -> ProductState {
        self.adapter.store().state()
    }

    pub fn subscribe(&self) -> watch::Receiver<ProductState> {
        self.adapter.store().subscribe()
    }

    pub fn dispatch(&self, action: ProductAction) {
        self.adapter.store().dispatch(action);
    }

    pub fn throttler(&self) -> &Arc<Throttler<Value>> {
        self.adapter.throttler()
    }

    pub fn get_products(&self, force_refresh: bool) -> BoxFuture<'static, Result<Vec<Product>>> {
        self.adapter.fetch(
            ProductResource::Products,
            RequestKey::new("getProducts"),
            BackendRequest::get("/api/products/list").field("products"),
            force_refresh,
            ProductAction::GetProductsSuccess,
        )
    }

    pub fn filter_products(
        &self,
        filter: &ProductsFilter,
        force_refresh: bool,
    ) -> BoxFuture<'static, Result<Vec<Product>>> {
        let key = match RequestKey::with_json("filterProducts", filter) {
            Ok(key) => key,
            Err(err) => return rejected(err),
        };
        self.adapter.fetch(
            ProductResource::Products,
            key,
            BackendRequest::post("/api/products/filter", json!({ "filter": filter })),
            force_refresh,
            ProductAction::FilterProductsSuccess,
        )
    }

    /// Resolves to `None` without touching the store when `id` is absent
    pub fn get_product(
        &self,
        id: Option<&str>,
        force_refresh: bool,
    ) -> BoxFuture<'static, Result<Option<Product>>> {
        let Some(id) = id else {
            return futures::future::ready(Ok(None)).boxed();
        };
        self.adapter
            .fetch(
                ProductResource::Product,
                RequestKey::with_param("getProduct", id),
                BackendRequest::post("/api/product/details", json!({ "id": id })),
                force_refresh,
                ProductAction::GetProductSuccess,
            )
            .map(|result| result.map(Some))
            .boxed()
    }

    pub fn get_related_products(
        &self,
        id: Option<&str>,
        force_refresh: bool,
    ) -> BoxFuture<'static, Result<Option<Vec<Product>>>> {
        let Some(id) = id else {
            return futures::future::ready(Ok(None)).boxed();
        };
        self.adapter
            .fetch(
                ProductResource::RelatedProducts,
                RequestKey::with_param("getRelatedProducts", id),
                BackendRequest::post("/api/product/related", json!({ "id": id })),
                force_refresh,
                ProductAction::GetRelatedProductsSuccess,
            )
            .map(|result| result.map(Some))
            .boxed()
    }

    pub fn get_product_reviews(&self, force_refresh: bool) -> BoxFuture<'static, Result<Vec<Review>>> {
        self.adapter.fetch(
            ProductResource::Reviews,
            RequestKey::new("getProductReviews"),
            BackendRequest::get("/api/review/list").field("productReviews"),
            force_refresh,
            ProductAction::GetProductReviewsSuccess,
        )
    }

    pub fn get_addresses(&self, force_refresh: bool) -> BoxFuture<'static, Result<Vec<Address>>> {
        self.adapter.fetch(
            ProductResource::Addresses,
            RequestKey::new("getAddresses"),
            BackendRequest::get("/api/address/list").field("address"),
            force_refresh,
            ProductAction::GetAddressesSuccess,
        )
    }

    /// Not deduplicated; retried like reads
    pub fn add_address(&self, address: &Address) -> BoxFuture<'static, Result<Vec<Address>>> {
        self.write_address("/api/address/new", address, ProductAction::AddAddressSuccess)
    }

    /// Not deduplicated; retried like reads
    pub fn edit_address(&self, address: &Address) -> BoxFuture<'static, Result<Vec<Address>>> {
        self.write_address("/api/address/edit", address, ProductAction::EditAddressSuccess)
    }

    fn write_address(
        &self,
        path: &'static str,
        address: &Address,
        on_success: fn(Vec<Address>) -> ProductAction,
    ) -> BoxFuture<'static, Result<Vec<Address>>> {
        let body = match serde_json::to_value(address) {
            Ok(body) => body,
            Err(err) => return rejected(err.into()),
        };
        self.adapter.mutate(
            ProductResource::Addresses,
            BackendRequest::post(path, body).field("address"),
            self.throttler().retry_policy().clone(),
            on_success,
        )
    }
}

impl Drop for ProductContext {
    fn drop(&mut self) {
        // Shared throttlers keep their state for the remaining owners
        if Arc::strong_count(self.adapter.throttler()) == 1 {
            self.adapter.throttler().reset();
        }
    }
}
