use std::collections::{HashMap, HashSet};

use chrono::Utc;
use sea_orm::sea_query::extension::postgres::PgExpr;
use sea_orm::sea_query::{Expr, Func, NullOrdering, Order, Query, SimpleExpr};
use sea_orm::{
    ColumnTrait, Condition, EntityTrait, JoinType, PaginatorTrait, QueryFilter, QueryOrder,
    QuerySelect, RelationTrait,
};
use uuid::Uuid;

use crate::{
    db::OrmConn,
    dto::products::{CategoryOption, FilterOptions, ProductList},
    entity::{
        Brands, Categories, Colors, Genders, ProductImages, ProductVariants, Products, Sizes,
        brands::{Column as BrandCol, Model as BrandModel},
        categories::{Column as CategoryCol, Model as CategoryModel},
        colors::{Column as ColorCol, Model as ColorModel},
        genders::{Column as GenderCol, Model as GenderModel},
        product_images::{Column as ImageCol, Model as ImageModel},
        product_variants::{Column as VariantCol, Model as VariantModel},
        products::{self, Column as ProductCol, Model as ProductModel},
        sizes::{Column as SizeCol, Model as SizeModel},
    },
    error::{AppError, AppResult},
    models::{
        BrandRef, CategoryRef, ColorRef, GenderRef, PriceRange, ProductDetail, ProductImage,
        ProductSummary, ProductVariant, SizeRef,
    },
    response::{ApiResponse, Meta},
    routes::params::{ProductFilters, SortKey},
    state::AppState,
};

pub const MAX_SUMMARY_IMAGES: usize = 5;
pub const FALLBACK_IMAGE: &str = "/shoes/shoe-1.jpg";

/// `COALESCE(sale_price, price)` over `product_variants`.
pub(crate) fn effective_price() -> SimpleExpr {
    Func::coalesce([
        Expr::col((ProductVariants, VariantCol::SalePrice)).into(),
        Expr::col((ProductVariants, VariantCol::Price)).into(),
    ])
    .into()
}

pub async fn list_products(
    state: &AppState,
    filters: &ProductFilters,
) -> AppResult<ApiResponse<ProductList>> {
    let page = filters.page() as i64;
    let limit = filters.limit() as i64;
    let empty = || {
        ApiResponse::success(
            "Products",
            ProductList {
                products: Vec::new(),
                total_count: 0,
            },
            Some(Meta::new(page, limit, 0)),
        )
    };

    let conn = &state.orm;
    let mut condition = Condition::all().add(ProductCol::IsPublished.eq(true));

    if let Some(search) = filters.search.as_ref() {
        let pattern = format!("%{search}%");
        condition = condition.add(
            Condition::any()
                .add(Expr::col((Products, ProductCol::Name)).ilike(pattern.clone()))
                .add(Expr::col((Products, ProductCol::Description)).ilike(pattern)),
        );
    }

    if !filters.gender.is_empty() {
        let ids = ids_for_slugs::<Genders>(conn, GenderCol::Slug, GenderCol::Id, &filters.gender)
            .await?;
        if ids.is_empty() {
            return Ok(empty());
        }
        condition = condition.add(ProductCol::GenderId.is_in(ids));
    }
    if !filters.brand.is_empty() {
        let ids =
            ids_for_slugs::<Brands>(conn, BrandCol::Slug, BrandCol::Id, &filters.brand).await?;
        if ids.is_empty() {
            return Ok(empty());
        }
        condition = condition.add(ProductCol::BrandId.is_in(ids));
    }
    if !filters.category.is_empty() {
        let ids = ids_for_slugs::<Categories>(
            conn,
            CategoryCol::Slug,
            CategoryCol::Id,
            &filters.category,
        )
        .await?;
        if ids.is_empty() {
            return Ok(empty());
        }
        condition = condition.add(ProductCol::CategoryId.is_in(ids));
    }

    let mut color_ids: Option<Vec<Uuid>> = None;
    if filters.has_variant_constraints() {
        // One variant row has to satisfy color, size and price together.
        let mut variant_cond = Condition::all();
        if !filters.color.is_empty() {
            let ids =
                ids_for_slugs::<Colors>(conn, ColorCol::Slug, ColorCol::Id, &filters.color).await?;
            if ids.is_empty() {
                return Ok(empty());
            }
            variant_cond = variant_cond.add(VariantCol::ColorId.is_in(ids.clone()));
            color_ids = Some(ids);
        }
        if !filters.size.is_empty() {
            let ids =
                ids_for_slugs::<Sizes>(conn, SizeCol::Slug, SizeCol::Id, &filters.size).await?;
            if ids.is_empty() {
                return Ok(empty());
            }
            variant_cond = variant_cond.add(VariantCol::SizeId.is_in(ids));
        }
        if let Some(min) = filters.price_min {
            variant_cond = variant_cond.add(Expr::expr(effective_price()).gte(min));
        }
        if let Some(max) = filters.price_max {
            variant_cond = variant_cond.add(Expr::expr(effective_price()).lte(max));
        }

        let matching = Query::select()
            .distinct()
            .column(VariantCol::ProductId)
            .from(ProductVariants)
            .cond_where(variant_cond)
            .to_owned();
        condition = condition.add(ProductCol::Id.in_subquery(matching));
    }

    let total = Products::find()
        .filter(condition.clone())
        .count(conn)
        .await? as i64;
    if total == 0 {
        return Ok(empty());
    }

    let finder = Products::find().filter(condition);
    let finder = match filters.sort {
        SortKey::Latest | SortKey::Featured => finder
            .order_by_desc(ProductCol::CreatedAt)
            .order_by_asc(ProductCol::Id),
        SortKey::PriceAsc => finder
            .join(JoinType::LeftJoin, products::Relation::ProductVariants.def())
            .group_by(ProductCol::Id)
            .order_by_with_nulls(
                SimpleExpr::from(Func::min(effective_price())),
                Order::Asc,
                NullOrdering::Last,
            )
            .order_by_asc(ProductCol::Id),
        SortKey::PriceDesc => finder
            .join(JoinType::LeftJoin, products::Relation::ProductVariants.def())
            .group_by(ProductCol::Id)
            .order_by_with_nulls(
                SimpleExpr::from(Func::max(effective_price())),
                Order::Desc,
                NullOrdering::Last,
            )
            .order_by_asc(ProductCol::Id),
    };

    let page_products = finder
        .limit(filters.limit())
        .offset(filters.offset())
        .all(conn)
        .await?;

    let products = summarize(conn, page_products, color_ids.as_deref()).await?;

    Ok(ApiResponse::success(
        "Products",
        ProductList {
            products,
            total_count: total,
        },
        Some(Meta::new(page, limit, total)),
    ))
}

pub async fn get_product(state: &AppState, id: Uuid) -> AppResult<ApiResponse<ProductDetail>> {
    let conn = &state.orm;
    let product = Products::find_by_id(id)
        .filter(ProductCol::IsPublished.eq(true))
        .one(conn)
        .await?
        .ok_or(AppError::NotFound)?;

    let refs = Lookups::load(conn, std::slice::from_ref(&product)).await?;

    let variants = ProductVariants::find()
        .filter(VariantCol::ProductId.eq(product.id))
        .order_by_asc(VariantCol::CreatedAt)
        .order_by_asc(VariantCol::Id)
        .all(conn)
        .await?;

    let colors: HashMap<Uuid, ColorModel> = Colors::find()
        .filter(ColorCol::Id.is_in(variants.iter().map(|v| v.color_id)))
        .all(conn)
        .await?
        .into_iter()
        .map(|c| (c.id, c))
        .collect();
    let sizes: HashMap<Uuid, SizeModel> = Sizes::find()
        .filter(SizeCol::Id.is_in(variants.iter().map(|v| v.size_id)))
        .all(conn)
        .await?
        .into_iter()
        .map(|s| (s.id, s))
        .collect();

    let images = ProductImages::find()
        .filter(ImageCol::ProductId.eq(product.id))
        .order_by_desc(ImageCol::IsPrimary)
        .order_by_asc(ImageCol::SortOrder)
        .order_by_asc(ImageCol::Id)
        .all(conn)
        .await?
        .into_iter()
        .map(image_from_entity)
        .collect();

    let price = PriceRange::from_prices(variants.iter().map(VariantModel::effective_price));
    let variants = variants
        .into_iter()
        .map(|v| variant_from_entity(v, &colors, &sizes))
        .collect::<AppResult<Vec<_>>>()?;

    let detail = ProductDetail {
        id: product.id,
        name: product.name.clone(),
        description: product.description.clone(),
        category: refs.category(&product)?,
        brand: refs.brand(&product)?,
        gender: refs.gender(&product)?,
        default_variant_id: product.default_variant_id,
        variants,
        images,
        min_price: price.min,
        max_price: price.max,
        has_price_range: price.is_range(),
        price_label: price.label(),
        created_at: product.created_at.with_timezone(&Utc),
        updated_at: product.updated_at.with_timezone(&Utc),
    };

    Ok(ApiResponse::success("Product", detail, None))
}

pub async fn list_filter_options(state: &AppState) -> AppResult<ApiResponse<FilterOptions>> {
    let conn = &state.orm;
    let genders = Genders::find()
        .order_by_asc(GenderCol::Label)
        .all(conn)
        .await?
        .into_iter()
        .map(gender_ref)
        .collect();
    let brands = Brands::find()
        .order_by_asc(BrandCol::Name)
        .all(conn)
        .await?
        .into_iter()
        .map(brand_ref)
        .collect();
    let categories = Categories::find()
        .order_by_asc(CategoryCol::Name)
        .all(conn)
        .await?
        .into_iter()
        .map(|c| CategoryOption {
            parent_id: c.parent_id,
            category: category_ref(c),
        })
        .collect();
    let colors = Colors::find()
        .order_by_asc(ColorCol::Name)
        .all(conn)
        .await?
        .into_iter()
        .map(color_ref)
        .collect();
    let sizes = Sizes::find()
        .order_by_asc(SizeCol::SortOrder)
        .order_by_asc(SizeCol::Name)
        .all(conn)
        .await?
        .into_iter()
        .map(size_ref)
        .collect();

    Ok(ApiResponse::success(
        "Filter options",
        FilterOptions {
            genders,
            brands,
            categories,
            colors,
            sizes,
        },
        None,
    ))
}

/// Build summaries for an already ordered page of products, keeping that order.
///
/// `color_ids` is the resolved color filter, if one was applied; it steers
/// image selection towards images tagged with a variant of those colors.
pub async fn summarize(
    conn: &OrmConn,
    page: Vec<ProductModel>,
    color_ids: Option<&[Uuid]>,
) -> AppResult<Vec<ProductSummary>> {
    if page.is_empty() {
        return Ok(Vec::new());
    }
    let ids: Vec<Uuid> = page.iter().map(|p| p.id).collect();
    let refs = Lookups::load(conn, &page).await?;

    let prices: HashMap<Uuid, PriceRange> = ProductVariants::find()
        .select_only()
        .column(VariantCol::ProductId)
        .column_as(SimpleExpr::from(Func::min(effective_price())), "min_price")
        .column_as(SimpleExpr::from(Func::max(effective_price())), "max_price")
        .filter(VariantCol::ProductId.is_in(ids.clone()))
        .group_by(VariantCol::ProductId)
        .into_tuple::<(Uuid, Option<i64>, Option<i64>)>()
        .all(conn)
        .await?
        .into_iter()
        .map(|(id, min, max)| (id, PriceRange::new(min.unwrap_or(0), max.unwrap_or(0))))
        .collect();

    let mut images: HashMap<Uuid, Vec<ImageModel>> = HashMap::new();
    for image in ProductImages::find()
        .filter(ImageCol::ProductId.is_in(ids.clone()))
        .order_by_desc(ImageCol::IsPrimary)
        .order_by_asc(ImageCol::SortOrder)
        .order_by_asc(ImageCol::Id)
        .all(conn)
        .await?
    {
        images.entry(image.product_id).or_default().push(image);
    }

    let color_variants: Option<HashSet<Uuid>> = match color_ids {
        Some(color_ids) => Some(
            ProductVariants::find()
                .select_only()
                .column(VariantCol::Id)
                .filter(VariantCol::ProductId.is_in(ids))
                .filter(VariantCol::ColorId.is_in(color_ids.iter().copied()))
                .into_tuple::<Uuid>()
                .all(conn)
                .await?
                .into_iter()
                .collect(),
        ),
        None => None,
    };

    page.into_iter()
        .map(|product| {
            let price = prices.get(&product.id).copied().unwrap_or_default();
            let gallery = images.get(&product.id).map(Vec::as_slice).unwrap_or(&[]);
            Ok(ProductSummary {
                id: product.id,
                name: product.name.clone(),
                description: product.description.clone(),
                min_price: price.min,
                max_price: price.max,
                has_price_range: price.is_range(),
                price_label: price.label(),
                images: select_images(gallery, color_variants.as_ref()),
                category: refs.category(&product)?,
                brand: refs.brand(&product)?,
                gender: refs.gender(&product)?,
                created_at: product.created_at.with_timezone(&Utc),
            })
        })
        .collect()
}

/// Pick up to five image urls for one product.
///
/// `images` must already be ordered primary first, then by sort order. With a
/// color filter, images tagged with a matching variant win; generic images are
/// used only when none match.
pub fn select_images(images: &[ImageModel], color_variants: Option<&HashSet<Uuid>>) -> Vec<String> {
    let chosen: Vec<String> = match color_variants {
        Some(matching) => {
            let tagged: Vec<String> = images
                .iter()
                .filter(|img| img.variant_id.is_some_and(|v| matching.contains(&v)))
                .take(MAX_SUMMARY_IMAGES)
                .map(|img| img.url.clone())
                .collect();
            if tagged.is_empty() {
                images
                    .iter()
                    .filter(|img| img.variant_id.is_none())
                    .take(MAX_SUMMARY_IMAGES)
                    .map(|img| img.url.clone())
                    .collect()
            } else {
                tagged
            }
        }
        None => images
            .iter()
            .take(MAX_SUMMARY_IMAGES)
            .map(|img| img.url.clone())
            .collect(),
    };

    if chosen.is_empty() {
        vec![FALLBACK_IMAGE.to_string()]
    } else {
        chosen
    }
}

async fn ids_for_slugs<E>(
    conn: &OrmConn,
    slug_col: E::Column,
    id_col: E::Column,
    slugs: &[String],
) -> AppResult<Vec<Uuid>>
where
    E: EntityTrait,
{
    let ids = E::find()
        .select_only()
        .column(id_col)
        .filter(slug_col.is_in(slugs.iter().cloned()))
        .into_tuple::<Uuid>()
        .all(conn)
        .await?;
    Ok(ids)
}

/// Category, brand and gender rows referenced by a set of products.
struct Lookups {
    categories: HashMap<Uuid, CategoryModel>,
    brands: HashMap<Uuid, BrandModel>,
    genders: HashMap<Uuid, GenderModel>,
}

impl Lookups {
    async fn load(conn: &OrmConn, products: &[ProductModel]) -> AppResult<Self> {
        let categories = Categories::find()
            .filter(CategoryCol::Id.is_in(products.iter().map(|p| p.category_id)))
            .all(conn)
            .await?
            .into_iter()
            .map(|m| (m.id, m))
            .collect();
        let brands = Brands::find()
            .filter(BrandCol::Id.is_in(products.iter().map(|p| p.brand_id)))
            .all(conn)
            .await?
            .into_iter()
            .map(|m| (m.id, m))
            .collect();
        let genders = Genders::find()
            .filter(GenderCol::Id.is_in(products.iter().map(|p| p.gender_id)))
            .all(conn)
            .await?
            .into_iter()
            .map(|m| (m.id, m))
            .collect();
        Ok(Self {
            categories,
            brands,
            genders,
        })
    }

    fn category(&self, product: &ProductModel) -> AppResult<CategoryRef> {
        self.categories
            .get(&product.category_id)
            .cloned()
            .map(category_ref)
            .ok_or_else(|| dangling("category", product.id))
    }

    fn brand(&self, product: &ProductModel) -> AppResult<BrandRef> {
        self.brands
            .get(&product.brand_id)
            .cloned()
            .map(brand_ref)
            .ok_or_else(|| dangling("brand", product.id))
    }

    fn gender(&self, product: &ProductModel) -> AppResult<GenderRef> {
        self.genders
            .get(&product.gender_id)
            .cloned()
            .map(gender_ref)
            .ok_or_else(|| dangling("gender", product.id))
    }
}

fn dangling(what: &str, product_id: Uuid) -> AppError {
    AppError::Internal(anyhow::anyhow!("product {product_id} has no {what}"))
}

pub(crate) fn category_ref(m: CategoryModel) -> CategoryRef {
    CategoryRef {
        id: m.id,
        name: m.name,
        slug: m.slug,
    }
}

pub(crate) fn brand_ref(m: BrandModel) -> BrandRef {
    BrandRef {
        id: m.id,
        name: m.name,
        slug: m.slug,
        logo_url: m.logo_url,
    }
}

pub(crate) fn gender_ref(m: GenderModel) -> GenderRef {
    GenderRef {
        id: m.id,
        label: m.label,
        slug: m.slug,
    }
}

pub(crate) fn color_ref(m: ColorModel) -> ColorRef {
    ColorRef {
        id: m.id,
        name: m.name,
        slug: m.slug,
        hex_code: m.hex_code,
    }
}

pub(crate) fn size_ref(m: SizeModel) -> SizeRef {
    SizeRef {
        id: m.id,
        name: m.name,
        slug: m.slug,
        sort_order: m.sort_order,
    }
}

fn image_from_entity(m: ImageModel) -> ProductImage {
    ProductImage {
        id: m.id,
        url: m.url,
        sort_order: m.sort_order,
        is_primary: m.is_primary,
        variant_id: m.variant_id,
    }
}

fn variant_from_entity(
    m: VariantModel,
    colors: &HashMap<Uuid, ColorModel>,
    sizes: &HashMap<Uuid, SizeModel>,
) -> AppResult<ProductVariant> {
    let color = colors
        .get(&m.color_id)
        .cloned()
        .map(color_ref)
        .ok_or_else(|| AppError::Internal(anyhow::anyhow!("variant {} has no color", m.id)))?;
    let size = sizes
        .get(&m.size_id)
        .cloned()
        .map(size_ref)
        .ok_or_else(|| AppError::Internal(anyhow::anyhow!("variant {} has no size", m.id)))?;
    Ok(ProductVariant {
        id: m.id,
        effective_price: m.effective_price(),
        sku: m.sku,
        price: m.price,
        sale_price: m.sale_price,
        color,
        size,
        in_stock: m.in_stock,
        weight: m.weight,
        dimensions: m.dimensions,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn image(url: &str, variant_id: Option<Uuid>) -> ImageModel {
        ImageModel {
            id: Uuid::new_v4(),
            product_id: Uuid::nil(),
            variant_id,
            url: url.to_string(),
            sort_order: 0,
            is_primary: false,
        }
    }

    #[test]
    fn no_images_falls_back() {
        assert_eq!(select_images(&[], None), vec![FALLBACK_IMAGE.to_string()]);
    }

    #[test]
    fn unfiltered_keeps_order_and_caps_at_five() {
        let images: Vec<_> = (0..7)
            .map(|i| image(&format!("/img/{i}.jpg"), None))
            .collect();
        let urls = select_images(&images, None);
        assert_eq!(urls.len(), MAX_SUMMARY_IMAGES);
        assert_eq!(urls[0], "/img/0.jpg");
        assert_eq!(urls[4], "/img/4.jpg");
    }

    #[test]
    fn color_filter_prefers_tagged_images() {
        let red = Uuid::new_v4();
        let blue = Uuid::new_v4();
        let images = vec![
            image("/generic.jpg", None),
            image("/blue.jpg", Some(blue)),
            image("/red.jpg", Some(red)),
        ];
        let matching: HashSet<Uuid> = [red].into_iter().collect();
        assert_eq!(select_images(&images, Some(&matching)), vec!["/red.jpg"]);
    }

    #[test]
    fn color_filter_without_tagged_match_uses_generic_only() {
        let blue = Uuid::new_v4();
        let images = vec![image("/blue.jpg", Some(blue)), image("/generic.jpg", None)];
        let matching: HashSet<Uuid> = HashSet::new();
        assert_eq!(select_images(&images, Some(&matching)), vec!["/generic.jpg"]);

        let only_tagged = vec![image("/blue.jpg", Some(blue))];
        assert_eq!(
            select_images(&only_tagged, Some(&matching)),
            vec![FALLBACK_IMAGE.to_string()]
        );
    }
}
